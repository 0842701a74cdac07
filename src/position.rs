// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::convert::TryFrom;
use std::fmt;

use thiserror::Error;

use crate::core::*;
use crate::zobrist;

/// FEN for the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Error)]
pub enum FenParseError {
    #[error("missing FEN field: {0}")]
    MissingField(&'static str),
    #[error("bad board layout: {0}")]
    BadBoard(String),
    #[error("bad side to move: {0}")]
    BadSideToMove(String),
    #[error("bad castling rights: {0}")]
    BadCastling(String),
    #[error("bad en passant square: {0}")]
    BadEnPassant(String),
    #[error("bad clock field: {0}")]
    BadClock(String),
}

/// Everything `unmake_move` needs to restore the previous position, plus the
/// position key before the move. The stack of these records doubles as the
/// game line that repetition detection walks.
#[derive(Copy, Clone, Debug)]
struct Undo {
    key: u64,
    castle_status: CastleStatus,
    en_passant_square: Option<Square>,
    halfmove_clock: u32,
    fullmove_clock: u32,
    captured: Option<(Piece, Square)>,
}

/// A chess position: piece placement, side to move, castling rights,
/// en-passant square, move clocks, the incrementally-maintained Zobrist key,
/// and the line of moves that produced it.
///
/// Moves are made and unmade in place; `make_move` pushes an [`Undo`] record
/// and `unmake_move` pops it, so a search that unwinds cleanly leaves the
/// position exactly as it found it, hash included.
#[derive(Clone)]
pub struct Position {
    board: [Option<Piece>; 64],
    side_to_move: Color,
    castle_status: CastleStatus,
    en_passant_square: Option<Square>,
    halfmove_clock: u32,
    fullmove_clock: u32,
    zobrist_hash: u64,
    game_line: Vec<Undo>,
}

impl Position {
    /// An empty board with White to move and no castling rights.
    pub fn empty() -> Position {
        Position {
            board: [None; 64],
            side_to_move: Color::White,
            castle_status: CastleStatus::NONE,
            en_passant_square: None,
            halfmove_clock: 0,
            fullmove_clock: 1,
            zobrist_hash: 0,
            game_line: Vec::new(),
        }
    }

    /// The standard starting position.
    pub fn starting() -> Position {
        Position::from_fen(START_FEN).expect("start FEN parses")
    }

    pub fn from_fen(fen: &str) -> Result<Position, FenParseError> {
        let mut fields = fen.split_whitespace();
        let layout = fields.next().ok_or(FenParseError::MissingField("board"))?;
        let side = fields.next().ok_or(FenParseError::MissingField("side"))?;
        let castling = fields.next().ok_or(FenParseError::MissingField("castling"))?;
        let en_passant = fields
            .next()
            .ok_or(FenParseError::MissingField("en passant"))?;
        let halfmove = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");

        let mut pos = Position::empty();
        let ranks: Vec<&str> = layout.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenParseError::BadBoard(layout.to_owned()));
        }

        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                } else {
                    let piece = Piece::try_from(c)
                        .map_err(|_| FenParseError::BadBoard(layout.to_owned()))?;
                    if file >= 8 {
                        return Err(FenParseError::BadBoard(layout.to_owned()));
                    }
                    pos.board[(rank * 8 + file) as usize] = Some(piece);
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenParseError::BadBoard(layout.to_owned()));
            }
        }

        pos.side_to_move = match side {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenParseError::BadSideToMove(other.to_owned())),
        };

        if castling != "-" {
            for c in castling.chars() {
                let right = match c {
                    'K' => CastleStatus::WHITE_KINGSIDE,
                    'Q' => CastleStatus::WHITE_QUEENSIDE,
                    'k' => CastleStatus::BLACK_KINGSIDE,
                    'q' => CastleStatus::BLACK_QUEENSIDE,
                    _ => return Err(FenParseError::BadCastling(castling.to_owned())),
                };
                pos.castle_status |= right;
            }
        }

        if en_passant != "-" {
            pos.en_passant_square = Some(
                en_passant
                    .parse()
                    .map_err(|_| FenParseError::BadEnPassant(en_passant.to_owned()))?,
            );
        }

        pos.halfmove_clock = halfmove
            .parse()
            .map_err(|_| FenParseError::BadClock(halfmove.to_owned()))?;
        pos.fullmove_clock = fullmove
            .parse()
            .map_err(|_| FenParseError::BadClock(fullmove.to_owned()))?;

        pos.zobrist_hash = pos.compute_hash();
        Ok(pos)
    }

    pub fn as_fen(&self) -> String {
        let mut fen = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.board[rank * 8 + file] {
                    Some(piece) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        fen.push(piece.as_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        if self.castle_status.is_empty() {
            fen.push('-');
        } else {
            for (right, c) in [
                (CastleStatus::WHITE_KINGSIDE, 'K'),
                (CastleStatus::WHITE_QUEENSIDE, 'Q'),
                (CastleStatus::BLACK_KINGSIDE, 'k'),
                (CastleStatus::BLACK_QUEENSIDE, 'q'),
            ] {
                if self.castle_status.contains(right) {
                    fen.push(c);
                }
            }
        }

        fen.push(' ');
        match self.en_passant_square {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }

        fen.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_clock));
        fen
    }

    /// Computes the Zobrist key of this position from scratch. `make_move`
    /// maintains the same key incrementally.
    fn compute_hash(&self) -> u64 {
        let mut hash = 0u64;
        for (sq, piece) in self.pieces() {
            zobrist::modify_piece(&mut hash, sq, piece);
        }
        if self.side_to_move == Color::Black {
            zobrist::modify_side_to_move(&mut hash);
        }
        zobrist::modify_castling(&mut hash, self.castle_status);
        zobrist::modify_en_passant(&mut hash, None, self.en_passant_square);
        hash
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.board[square.index()]
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn castle_status(&self) -> CastleStatus {
        self.castle_status
    }

    pub fn en_passant_square(&self) -> Option<Square> {
        self.en_passant_square
    }

    /// The fifty-move counter, in half-moves since the last capture or pawn
    /// move.
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_clock(&self) -> u32 {
        self.fullmove_clock
    }

    pub fn zobrist_hash(&self) -> u64 {
        self.zobrist_hash
    }

    /// Half-moves recorded on the game line since this position's origin.
    pub fn plies_played(&self) -> usize {
        self.game_line.len()
    }

    /// Iterator over the occupied squares.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.board
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|piece| (Square(i as u8), piece)))
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| *p == Piece::new(color, PieceKind::King))
            .map(|(sq, _)| sq)
    }

    pub fn count_pieces(&self, color: Color, kind: PieceKind) -> u32 {
        self.pieces()
            .filter(|(_, p)| *p == Piece::new(color, kind))
            .count() as u32
    }

    /// Non-pawn material for `color`, weighted N=3, B=3, R=5, Q=10. The
    /// null-move gate and the insufficient-material rules both count in
    /// these units.
    pub fn non_pawn_material(&self, color: Color) -> i32 {
        self.pieces()
            .filter(|(_, p)| p.color == color)
            .map(|(_, p)| match p.kind {
                PieceKind::Knight | PieceKind::Bishop => 3,
                PieceKind::Rook => 5,
                PieceKind::Queen => 10,
                PieceKind::Pawn | PieceKind::King => 0,
            })
            .sum()
    }

    /// Whether `target` is attacked by any piece of `by`.
    pub fn square_attacked(&self, target: Square, by: Color) -> bool {
        const KNIGHT_JUMPS: [(i8, i8); 8] = [
            (1, 2),
            (2, 1),
            (2, -1),
            (1, -2),
            (-1, -2),
            (-2, -1),
            (-2, 1),
            (-1, 2),
        ];
        for (dr, df) in KNIGHT_JUMPS {
            if let Some(sq) = target.offset(dr, df) {
                if self.board[sq.index()] == Some(Piece::new(by, PieceKind::Knight)) {
                    return true;
                }
            }
        }

        const KING_STEPS: [(i8, i8); 8] = [
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
        ];
        for (dr, df) in KING_STEPS {
            if let Some(sq) = target.offset(dr, df) {
                if self.board[sq.index()] == Some(Piece::new(by, PieceKind::King)) {
                    return true;
                }
            }
        }

        // A pawn of `by` attacks `target` from one rank behind it, on an
        // adjacent file.
        let forward: i8 = match by {
            Color::White => 1,
            Color::Black => -1,
        };
        for df in [-1, 1] {
            if let Some(sq) = target.offset(-forward, df) {
                if self.board[sq.index()] == Some(Piece::new(by, PieceKind::Pawn)) {
                    return true;
                }
            }
        }

        for (dr, df) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            if let Some(piece) = self.first_piece_on_ray(target, dr, df) {
                if piece.color == by
                    && matches!(piece.kind, PieceKind::Rook | PieceKind::Queen)
                {
                    return true;
                }
            }
        }
        for (dr, df) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
            if let Some(piece) = self.first_piece_on_ray(target, dr, df) {
                if piece.color == by
                    && matches!(piece.kind, PieceKind::Bishop | PieceKind::Queen)
                {
                    return true;
                }
            }
        }

        false
    }

    fn first_piece_on_ray(&self, start: Square, dr: i8, df: i8) -> Option<Piece> {
        let mut sq = start;
        while let Some(next) = sq.offset(dr, df) {
            if let Some(piece) = self.board[next.index()] {
                return Some(piece);
            }
            sq = next;
        }
        None
    }

    pub fn is_check(&self, us: Color) -> bool {
        match self.king_square(us) {
            Some(king) => self.square_attacked(king, us.toggle()),
            None => false,
        }
    }

    /// How many times the current position has occurred on the game line,
    /// including right now. Walks backward by two half-moves at a time (the
    /// same side must be to move), no further back than the fifty-move
    /// counter reaches.
    pub fn repetition_count(&self) -> usize {
        let mut rep = 1;
        let n = self.game_line.len();
        let window = (self.halfmove_clock as usize).min(n);
        let oldest = n - window;
        let mut i = n as isize - 2;
        while i >= oldest as isize {
            if self.game_line[i as usize].key == self.zobrist_hash {
                rep += 1;
            }
            i -= 2;
        }
        rep
    }

    /// Makes a pseudo-legal move, updating the board, the clocks, and the
    /// Zobrist key incrementally. The move may leave the mover's own king
    /// attacked; callers filter those positions out after the fact.
    pub fn make_move(&mut self, mov: Move) {
        let side = self.side_to_move;
        let from = mov.source();
        let to = mov.destination();
        let piece = self.board[from.index()].expect("no piece on move source");

        let captured = if mov.is_en_passant() {
            let behind: i8 = match side {
                Color::White => -1,
                Color::Black => 1,
            };
            let sq = to.offset(behind, 0).expect("en passant off board");
            Some((
                self.board[sq.index()].expect("no pawn behind en passant target"),
                sq,
            ))
        } else if mov.is_capture() {
            Some((
                self.board[to.index()].expect("no piece on capture target"),
                to,
            ))
        } else {
            None
        };

        self.game_line.push(Undo {
            key: self.zobrist_hash,
            castle_status: self.castle_status,
            en_passant_square: self.en_passant_square,
            halfmove_clock: self.halfmove_clock,
            fullmove_clock: self.fullmove_clock,
            captured,
        });

        if let Some((cap, sq)) = captured {
            self.board[sq.index()] = None;
            zobrist::modify_piece(&mut self.zobrist_hash, sq, cap);
        }

        self.board[from.index()] = None;
        zobrist::modify_piece(&mut self.zobrist_hash, from, piece);
        let placed = if mov.is_promotion() {
            Piece::new(side, mov.promotion_piece())
        } else {
            piece
        };
        self.board[to.index()] = Some(placed);
        zobrist::modify_piece(&mut self.zobrist_hash, to, placed);

        if mov.is_castle() {
            let (rook_from, rook_to) = match (side, mov.is_kingside_castle()) {
                (Color::White, true) => (H1, F1),
                (Color::White, false) => (A1, D1),
                (Color::Black, true) => (H8, F8),
                (Color::Black, false) => (A8, D8),
            };
            let rook = self.board[rook_from.index()].expect("no rook to castle with");
            self.board[rook_from.index()] = None;
            zobrist::modify_piece(&mut self.zobrist_hash, rook_from, rook);
            self.board[rook_to.index()] = Some(rook);
            zobrist::modify_piece(&mut self.zobrist_hash, rook_to, rook);
        }

        let new_ep = if mov.is_double_pawn_push() {
            let behind: i8 = match side {
                Color::White => -1,
                Color::Black => 1,
            };
            to.offset(behind, 0)
        } else {
            None
        };
        zobrist::modify_en_passant(&mut self.zobrist_hash, self.en_passant_square, new_ep);
        self.en_passant_square = new_ep;

        let mut rights = self.castle_status;
        if piece.kind == PieceKind::King {
            rights.remove(match side {
                Color::White => CastleStatus::WHITE,
                Color::Black => CastleStatus::BLACK,
            });
        }
        for (corner, right) in [
            (A1, CastleStatus::WHITE_QUEENSIDE),
            (H1, CastleStatus::WHITE_KINGSIDE),
            (A8, CastleStatus::BLACK_QUEENSIDE),
            (H8, CastleStatus::BLACK_KINGSIDE),
        ] {
            if from == corner || to == corner {
                rights.remove(right);
            }
        }
        zobrist::modify_castling(&mut self.zobrist_hash, self.castle_status - rights);
        self.castle_status = rights;

        if piece.kind == PieceKind::Pawn || mov.is_capture() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if side == Color::Black {
            self.fullmove_clock += 1;
        }

        self.side_to_move = side.toggle();
        zobrist::modify_side_to_move(&mut self.zobrist_hash);
    }

    /// Unmakes the most recent move, which must be `mov`.
    pub fn unmake_move(&mut self, mov: Move) {
        let undo = self.game_line.pop().expect("unmake with no move made");
        let side = self.side_to_move.toggle();
        let from = mov.source();
        let to = mov.destination();

        let placed = self.board[to.index()].expect("no piece on unmake target");
        self.board[to.index()] = None;
        self.board[from.index()] = Some(if mov.is_promotion() {
            Piece::new(side, PieceKind::Pawn)
        } else {
            placed
        });

        if let Some((cap, sq)) = undo.captured {
            self.board[sq.index()] = Some(cap);
        }

        if mov.is_castle() {
            let (rook_from, rook_to) = match (side, mov.is_kingside_castle()) {
                (Color::White, true) => (H1, F1),
                (Color::White, false) => (A1, D1),
                (Color::Black, true) => (H8, F8),
                (Color::Black, false) => (A8, D8),
            };
            let rook = self.board[rook_to.index()].expect("no rook to uncastle");
            self.board[rook_to.index()] = None;
            self.board[rook_from.index()] = Some(rook);
        }

        self.side_to_move = side;
        self.castle_status = undo.castle_status;
        self.en_passant_square = undo.en_passant_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.fullmove_clock = undo.fullmove_clock;
        self.zobrist_hash = undo.key;
    }

    /// Passes the turn: flips the side to move and its key. The board, the
    /// clocks, and the game line are untouched.
    pub fn make_null_move(&mut self) {
        self.side_to_move = self.side_to_move.toggle();
        zobrist::modify_side_to_move(&mut self.zobrist_hash);
    }

    pub fn unmake_null_move(&mut self) {
        self.side_to_move = self.side_to_move.toggle();
        zobrist::modify_side_to_move(&mut self.zobrist_hash);
    }
}

impl Default for Position {
    fn default() -> Position {
        Position::starting()
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.as_fen())
    }
}
