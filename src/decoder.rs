//! Decodes one hour of a vendor `.bi5` archive into an ordered tick
//! sequence. Treated by the rest of this crate as a boundary: the only
//! thing above it that matters is the [`TickDecoder`] contract (output
//! non-decreasing by timestamp, all timestamps inside the hour, prices and
//! volumes populated).
//!
//! Grounded directly on the teacher's `decompress_data` (LZMA via
//! `lzma_rs::lzma_decompress`) and `buffer_to_ticks`/`create_tick` (20-byte
//! big-endian records via `byteorder::BigEndian`), generalized to also
//! stamp `symbol`, [`StreamId`] and [`Origin`] onto each tick.

use byteorder::{BigEndian, ByteOrder};
use lzma_rs::lzma_decompress;
use time::OffsetDateTime;

use crate::error::{Error, Kind};
use crate::model::{Origin, StreamId, Tick};

/// Decodes the raw bytes of one hourly archive into ticks.
pub trait TickDecoder: Send + Sync {
    fn decode(
        &self,
        bytes: &[u8],
        symbol: &str,
        hour_start: OffsetDateTime,
        stream_id: StreamId,
        origin: Origin,
    ) -> Result<Vec<Tick>, Error>;
}

/// The real Dukascopy `.bi5` format: LZMA-compressed, 20-byte big-endian
/// records of `(offset_millis: u32, ask_points: u32, bid_points: u32,
/// ask_volume: f32, bid_volume: f32)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bi5Decoder;

impl TickDecoder for Bi5Decoder {
    fn decode(
        &self,
        bytes: &[u8],
        symbol: &str,
        hour_start: OffsetDateTime,
        stream_id: StreamId,
        origin: Origin,
    ) -> Result<Vec<Tick>, Error> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let mut decompressed = Vec::<u8>::new();
        lzma_decompress(&mut &bytes[..], &mut decompressed)
            .map_err(|e| Error::with_source(Kind::Io, "failed to LZMA-decompress tick archive", e))?;

        if decompressed.len() % 20 != 0 {
            return Err(Error::io(format!(
                "decompressed tick archive length {} is not a multiple of 20",
                decompressed.len()
            )));
        }

        let hour_start_millis = (hour_start.unix_timestamp_nanos() / 1_000_000) as i64;

        Ok(decompressed
            .chunks_exact(20)
            .map(|record| {
                let offset_millis = BigEndian::read_u32(&record[0..4]) as i64;
                let ask = BigEndian::read_u32(&record[4..8]) as i64;
                let bid = BigEndian::read_u32(&record[8..12]) as i64;
                let ask_volume = BigEndian::read_f32(&record[12..16]);
                let bid_volume = BigEndian::read_f32(&record[16..20]);

                Tick {
                    time_millis: hour_start_millis + offset_millis,
                    symbol: symbol.to_string(),
                    stream_id,
                    bid,
                    ask,
                    bid_volume,
                    ask_volume,
                    origin,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lzma_rs::lzma_compress;
    use time::macros::datetime;

    #[test]
    fn decodes_a_single_record() {
        let mut bytes = vec![0u8; 20];
        BigEndian::write_u32(&mut bytes[0..4], 218);
        BigEndian::write_u32(&mut bytes[4..8], 0x0001B4C7);
        BigEndian::write_u32(&mut bytes[8..12], 0x0001B4C4);
        BigEndian::write_f32(&mut bytes[12..16], 1.12);
        BigEndian::write_f32(&mut bytes[16..20], 0.75);

        let mut compressed = Vec::new();
        lzma_compress(&mut &bytes[..], &mut compressed).unwrap();

        let decoder = Bi5Decoder;
        let ticks = decoder
            .decode(
                &compressed,
                "EURGBP",
                datetime!(2020-03-12 01:00 UTC),
                StreamId::REALTIME,
                Origin::Historical,
            )
            .unwrap();

        assert_eq!(ticks.len(), 1);
        let tick = &ticks[0];
        assert_eq!(tick.time_millis, datetime!(2020-03-12 01:00 UTC).unix_timestamp() * 1000 + 218);
        assert_eq!(tick.ask, 0x0001B4C7);
        assert_eq!(tick.bid, 0x0001B4C4);
        assert!((tick.ask_volume - 1.12).abs() < 0.000_001);
        assert_eq!(tick.bid_volume, 0.75);
    }

    #[test]
    fn empty_archive_decodes_to_no_ticks() {
        let decoder = Bi5Decoder;
        let ticks = decoder
            .decode(
                &[],
                "EURGBP",
                datetime!(2020-03-12 01:00 UTC),
                StreamId::REALTIME,
                Origin::Historical,
            )
            .unwrap();
        assert!(ticks.is_empty());
    }
}
