//! JSON test vector loader shared by the vector suites.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::fs;

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// A file of vectors: a shared `context` plus the cases run against it.
#[derive(Debug, Deserialize)]
pub struct VectorFile<C, T> {
    pub description: String,
    pub context: C,
    pub cases: Vec<T>,
}

pub fn load<C: DeserializeOwned, T: DeserializeOwned>(name: &str) -> VectorFile<C, T> {
    let s = fs::read_to_string(format!("tests/vectors/{name}"))
        .unwrap_or_else(|e| panic!("read vector {name}: {e}"));
    serde_json::from_str(&s).unwrap_or_else(|e| panic!("parse vector {name}: {e}"))
}
