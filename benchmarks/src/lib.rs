//! Corpus synthétique partagé par les benches.

use std::fmt::Write as _;

/// Liste de `n` commandes variées, une par ligne, avec attentes et commentaires.
pub fn synthetic_cmdlist(n: usize) -> String {
    let mut s = String::with_capacity(n * 16);
    for i in 0..n {
        let _ = match i % 8 {
            0 => writeln!(s, "ttl({}) = {} t={}", i % 32, i % 2, i % 100),
            1 => writeln!(s, "freq({}) = {}", i % 22, i * 1000),
            2 => writeln!(s, "amp({}) = {}", i % 22, i % 4096),
            3 => writeln!(s, "phase({}) = {}; wait({})", i % 22, i % 65536, i % 50),
            4 => writeln!(s, "dac({}) = {}", i % 4, i % 65536),
            5 => writeln!(s, "clock({})", i % 256),
            6 => writeln!(s, "# step {i}"),
            _ => writeln!(s, "ttl = {:#x}", i),
        };
    }
    s
}
