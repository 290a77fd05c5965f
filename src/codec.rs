//! Binary and hexadecimal wire format.
//!
//! The layout is the packed bit array followed by a 20-byte metadata
//! trailer: estimated elements (u64), elements added (u64) and the
//! single-precision false positive rate. The bit and hash counts are
//! never written; they are rederived from the trailer on load.
//!
//! The binary trailer is little-endian while the hex trailer is
//! big-endian. The mismatch is inherited from the format this crate
//! interoperates with; normalizing it would break every filter already
//! persisted in either encoding.

use crate::config::FilterParams;
use crate::error::{BloomError, Result};
use byteorder::{
    BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt,
};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Trailer length: two u64 counters plus an f32 rate.
pub const TRAILER_LEN: usize = 20;

/// A fully decoded filter image: rederived geometry, the persisted
/// counter, and the raw bit array.
pub(crate) struct Decoded {
    pub params: FilterParams,
    pub elements_added: u64,
    pub bits: Vec<u8>,
}

pub(crate) fn encode<W: Write>(
    sink: &mut W,
    bits: &[u8],
    estimated_elements: u64,
    elements_added: u64,
    false_positive_rate: f32,
) -> Result<()> {
    sink.write_all(bits)?;
    sink.write_u64::<LittleEndian>(estimated_elements)?;
    sink.write_u64::<LittleEndian>(elements_added)?;
    sink.write_f32::<LittleEndian>(false_positive_rate)?;
    sink.flush()?;
    Ok(())
}

pub(crate) fn encode_hex(
    bits: &[u8],
    estimated_elements: u64,
    elements_added: u64,
    false_positive_rate: f32,
) -> String {
    let mut trailer = [0u8; TRAILER_LEN];
    BigEndian::write_u64(&mut trailer[0..8], estimated_elements);
    BigEndian::write_u64(&mut trailer[8..16], elements_added);
    BigEndian::write_f32(&mut trailer[16..20], false_positive_rate);
    let mut out = hex::encode(bits);
    out.push_str(&hex::encode(trailer));
    out
}

pub(crate) fn decode(buf: &[u8]) -> Result<Decoded> {
    if buf.len() < TRAILER_LEN {
        return Err(BloomError::CorruptData(format!(
            "{} bytes is shorter than the {TRAILER_LEN}-byte trailer",
            buf.len()
        )));
    }
    let (bits, trailer) = buf.split_at(buf.len() - TRAILER_LEN);
    finish_decode(
        bits,
        LittleEndian::read_u64(&trailer[0..8]),
        LittleEndian::read_u64(&trailer[8..16]),
        LittleEndian::read_f32(&trailer[16..20]),
    )
}

pub(crate) fn decode_hex(hex_string: &str) -> Result<Decoded> {
    let raw = hex::decode(hex_string).map_err(|err| {
        BloomError::CorruptData(format!("invalid hex encoding: {err}"))
    })?;
    if raw.len() < TRAILER_LEN {
        return Err(BloomError::CorruptData(format!(
            "{} bytes is shorter than the {TRAILER_LEN}-byte trailer",
            raw.len()
        )));
    }
    let (bits, trailer) = raw.split_at(raw.len() - TRAILER_LEN);
    finish_decode(
        bits,
        BigEndian::read_u64(&trailer[0..8]),
        BigEndian::read_u64(&trailer[8..16]),
        BigEndian::read_f32(&trailer[16..20]),
    )
}

fn finish_decode(
    bits: &[u8],
    estimated_elements: u64,
    elements_added: u64,
    false_positive_rate: f32,
) -> Result<Decoded> {
    let params = derive_params(estimated_elements, false_positive_rate)?;
    if bits.len() != params.byte_length() {
        return Err(BloomError::CorruptData(format!(
            "bit array is {} bytes but the derived geometry needs {}",
            bits.len(),
            params.byte_length()
        )));
    }
    Ok(Decoded {
        params,
        elements_added,
        bits: bits.to_vec(),
    })
}

/// Reads the trailer from the end of a filter file and rederives the
/// geometry, without touching the bit array.
pub(crate) fn read_file_params(path: &Path) -> Result<(FilterParams, u64)> {
    let mut file = File::open(path)?;
    read_trailer(&mut file)
}

/// Loads a complete filter image from a file.
pub(crate) fn decode_file(path: &Path) -> Result<Decoded> {
    let mut file = File::open(path)?;
    let (params, elements_added) = read_trailer(&mut file)?;
    file.seek(SeekFrom::Start(0))?;
    let mut bits = vec![0u8; params.byte_length()];
    file.read_exact(&mut bits)?;
    debug!(
        path = %path.display(),
        bits = params.num_bits,
        "loaded bloom filter image"
    );
    Ok(Decoded {
        params,
        elements_added,
        bits,
    })
}

fn read_trailer(file: &mut File) -> Result<(FilterParams, u64)> {
    let len = file.metadata()?.len();
    if len < TRAILER_LEN as u64 {
        return Err(BloomError::CorruptData(format!(
            "{len} bytes is shorter than the {TRAILER_LEN}-byte trailer"
        )));
    }
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    let estimated_elements = file.read_u64::<LittleEndian>()?;
    let elements_added = file.read_u64::<LittleEndian>()?;
    let false_positive_rate = file.read_f32::<LittleEndian>()?;
    let params = derive_params(estimated_elements, false_positive_rate)?;
    let expected = (params.byte_length() + TRAILER_LEN) as u64;
    if len != expected {
        return Err(BloomError::CorruptData(format!(
            "file is {len} bytes but the derived geometry needs {expected}"
        )));
    }
    Ok((params, elements_added))
}

fn derive_params(
    estimated_elements: u64,
    false_positive_rate: f32,
) -> Result<FilterParams> {
    FilterParams::derive(estimated_elements, f64::from(false_positive_rate))
        .map_err(|_| {
            BloomError::CorruptData(format!(
                "trailer parameters out of range: {estimated_elements} elements, rate {false_positive_rate}"
            ))
        })
}

/// Writes a fresh filter file: a zeroed bit array and a trailer with no
/// elements recorded yet.
pub(crate) fn write_empty_file(
    path: &Path,
    params: &FilterParams,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(&file);
    writer.write_all(&vec![0u8; params.byte_length()])?;
    writer.write_u64::<LittleEndian>(params.estimated_elements)?;
    writer.write_u64::<LittleEndian>(0)?;
    writer.write_f32::<LittleEndian>(params.false_positive_rate)?;
    writer.flush()?;
    file.sync_all()?;
    debug!(
        path = %path.display(),
        bytes = params.byte_length() + TRAILER_LEN,
        "wrote empty filter file"
    );
    Ok(())
}
