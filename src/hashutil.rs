// src/hashutil.rs

//! Lowercase hex encoding shared by every SHA-256-based hash in this crate
//! (graph hash, plan hash, trace hash). Content hashing of file bytes stays
//! on `blake3`, which renders its own hex via `Hash::to_hex`.

use std::fmt::Write;

pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    let bytes = bytes.as_ref();
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String never fails");
    }
    out
}
