//! Saved-plan payload encoding.
//!
//! The `encoding` annotation selects the payload format: absent means raw
//! bytes, `gzip` means gzip. Any other value is rejected in both directions.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CoreError;

pub const ENCODING_ANNOTATION: &str = "encoding";
pub const GZIP: &str = "gzip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEncoding {
    Raw,
    Gzip,
}

impl PlanEncoding {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self, CoreError> {
        match annotations.get(ENCODING_ANNOTATION).map(String::as_str) {
            None => Ok(Self::Raw),
            Some(GZIP) => Ok(Self::Gzip),
            Some(other) => Err(CoreError::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn annotate(self, annotations: &mut BTreeMap<String, String>) {
        match self {
            Self::Raw => {
                annotations.remove(ENCODING_ANNOTATION);
            }
            Self::Gzip => {
                annotations.insert(ENCODING_ANNOTATION.to_string(), GZIP.to_string());
            }
        }
    }

    pub fn encode(self, plan: &[u8]) -> Result<Vec<u8>, CoreError> {
        match self {
            Self::Raw => Ok(plan.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(plan)?;
                Ok(encoder.finish()?)
            }
        }
    }

    pub fn decode(self, payload: &[u8]) -> Result<Vec<u8>, CoreError> {
        match self {
            Self::Raw => Ok(payload.to_vec()),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(payload);
                let mut plan = Vec::new();
                decoder.read_to_end(&mut plan)?;
                Ok(plan)
            }
        }
    }
}

/// Encode `plan` according to the annotations it will be stored with.
pub fn encode_plan(
    plan: &[u8],
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<u8>, CoreError> {
    PlanEncoding::from_annotations(annotations)?.encode(plan)
}

/// Decode a stored payload according to its annotations.
pub fn decode_plan(
    payload: &[u8],
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<u8>, CoreError> {
    PlanEncoding::from_annotations(annotations)?.decode(payload)
}
