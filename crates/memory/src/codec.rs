#![forbid(unsafe_code)]

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sampler::{Transition, Transitions};
use tokenize::TokenId;

use crate::Result;

/// Serialise a transition map as zlib-compressed bincode of
/// `(target, occurrences, last_observed)` triples.
pub fn encode_children(children: &Transitions) -> Result<Vec<u8>> {
    let triples: Vec<(TokenId, u32, i64)> = children
        .iter()
        .map(|(id, t)| (id, t.occurrences, t.last_observed))
        .collect();
    let raw = bincode::serialize(&triples)?;
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`encode_children`].
pub fn decode_children(blob: &[u8]) -> Result<Transitions> {
    let mut raw = Vec::new();
    ZlibDecoder::new(blob).read_to_end(&mut raw)?;
    let triples: Vec<(TokenId, u32, i64)> = bincode::deserialize(&raw)?;
    Ok(triples
        .into_iter()
        .map(|(id, occurrences, last_observed)| (id, Transition { occurrences, last_observed }))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_survive_the_blob() {
        let mut t = Transitions::new();
        t.increment_at(tokenize::BOUNDARY_ID, 11);
        t.increment_at(-5, 12);
        t.increment_at(-5, 13);
        let blob = encode_children(&t).unwrap_or_default();
        assert!(!blob.is_empty());
        assert_eq!(decode_children(&blob).ok(), Some(t));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_children(b"not zlib at all").is_err());
    }
}
