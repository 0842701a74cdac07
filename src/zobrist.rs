// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Zobrist keys for positions. A position's key is the XOR of one constant
//! per (piece, square) pair on the board, one constant when Black is to
//! move, one constant per extant castling right, and one constant per
//! en-passant target file. Equal positions always produce equal keys;
//! distinct positions collide only by accident, which the replacement cache
//! treats as acceptable noise.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::core::{CastleStatus, Color, File, Piece, Square};

struct ZobristKeys {
    /// One key per (square, piece) pair; pieces indexed white-then-black.
    pieces: [[u64; 12]; 64],
    /// XORed in when Black is to move.
    side: u64,
    /// One key per castling right, in `CastleStatus` bit order.
    castling: [u64; 4],
    /// One key per en-passant target file.
    en_passant: [u64; 8],
}

impl ZobristKeys {
    fn new(seed: u64) -> ZobristKeys {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut keys = ZobristKeys {
            pieces: [[0; 12]; 64],
            side: wide_word(&mut rng),
            castling: [0; 4],
            en_passant: [0; 8],
        };

        for square in keys.pieces.iter_mut() {
            for key in square.iter_mut() {
                *key = wide_word(&mut rng);
            }
        }
        for key in keys.castling.iter_mut() {
            *key = wide_word(&mut rng);
        }
        for key in keys.en_passant.iter_mut() {
            *key = wide_word(&mut rng);
        }

        keys
    }

    fn piece(&self, square: Square, piece: Piece) -> u64 {
        let offset = match piece.color {
            Color::White => 0,
            Color::Black => 6,
        };
        self.pieces[square.index()][offset + piece.kind.index()]
    }
}

/// Assembles a 64-bit key from five 15-bit draws XOR-shifted into disjoint
/// bit positions, so that no single draw dominates the word.
fn wide_word(rng: &mut SmallRng) -> u64 {
    let mut word = 0u64;
    for shift in [0, 15, 30, 45, 60] {
        word ^= ((rng.gen::<u16>() & 0x7fff) as u64) << shift;
    }
    word
}

const ZOBRIST_SEED: u64 = 0x9e52_72f0_43a1_d4c6;

lazy_static::lazy_static! {
    static ref KEYS: ZobristKeys = ZobristKeys::new(ZOBRIST_SEED);
}

pub fn modify_piece(hash: &mut u64, square: Square, piece: Piece) {
    *hash ^= KEYS.piece(square, piece);
}

pub fn modify_side_to_move(hash: &mut u64) {
    *hash ^= KEYS.side;
}

/// XORs in or out the keys of every right present in `rights`.
pub fn modify_castling(hash: &mut u64, rights: CastleStatus) {
    const ORDER: [CastleStatus; 4] = [
        CastleStatus::WHITE_KINGSIDE,
        CastleStatus::WHITE_QUEENSIDE,
        CastleStatus::BLACK_KINGSIDE,
        CastleStatus::BLACK_QUEENSIDE,
    ];

    for (i, right) in ORDER.iter().enumerate() {
        if rights.contains(*right) {
            *hash ^= KEYS.castling[i];
        }
    }
}

pub fn modify_en_passant(hash: &mut u64, old: Option<Square>, new: Option<Square>) {
    fn file_key(file: File) -> u64 {
        KEYS.en_passant[file.index()]
    }

    match (old, new) {
        (Some(old), Some(new)) => {
            *hash ^= file_key(old.file());
            *hash ^= file_key(new.file());
        }
        (Some(sq), None) | (None, Some(sq)) => {
            *hash ^= file_key(sq.file());
        }
        (None, None) => {}
    }
}
