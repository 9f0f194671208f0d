//! Shared helpers for the wire-level integration tests: a scripted
//! transport and seeded generators for round-trip vectors.

use std::collections::VecDeque;
use std::io;

use h1kit::Transport;
use rand::RngCore;
use rand_xoshiro::{Xoshiro256PlusPlus, rand_core::SeedableRng};

/// Transport scripted from a byte buffer; everything sent accumulates in
/// `output`.
pub struct Scripted {
    input: VecDeque<u8>,
    pub output: Vec<u8>,
    pub shut: bool,
}

impl Scripted {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
            shut: false,
        }
    }
}

impl Transport for Scripted {
    fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.input.len().min(buf.len());

        for slot in buf.iter_mut().take(count) {
            *slot = self.input.pop_front().unwrap();
        }

        Ok(count)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shut = true;
        Ok(())
    }
}

pub fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

pub fn random_bytes(rng: &mut Xoshiro256PlusPlus, max_len: usize) -> Vec<u8> {
    let length = (rng.next_u64() as usize) % max_len + 1;
    let mut data = vec![0u8; length];
    rng.fill_bytes(&mut data);
    data
}

/// A chunk sequence ending in the mandatory empty-data chunk.
pub fn chunk_sequence(seed: u64) -> Vec<(Option<(String, String)>, Vec<u8>)> {
    let mut rng = rng(seed);
    let count = (rng.next_u32() % 6) as usize + 1;
    let mut parts = Vec::new();

    for index in 0..count {
        let data = random_bytes(&mut rng, 5000);

        let extension = if rng.next_u32() % 3 == 0 {
            Some((format!("part{index}"), format!("{}", rng.next_u32() % 100)))
        } else {
            None
        };

        parts.push((extension, data));
    }

    parts.push((None, Vec::new()));
    parts
}
