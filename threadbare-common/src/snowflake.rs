//! Snowflake ids: 42 bits of milliseconds since [`EPOCH`], 10 bits of node
//! id, 12 bits of per-node sequence. Ids sort by creation time, so insertion
//! order and id order agree.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::{Duration, UtcDateTime, macros::utc_datetime};

/// Zero point for the timestamp part of every snowflake.
pub const EPOCH: UtcDateTime = utc_datetime!(2024-01-01 00:00);

pub const TIMESTAMP_BITS: u64 = 42;
pub const NODE_ID_BITS: u64 = 10;
pub const SEQUENCE_BITS: u64 = 12;

const NODE_ID_SHIFT: u64 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u64 = NODE_ID_BITS + SEQUENCE_BITS;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Snowflake(u64);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NodeId(u16);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Sequence(u16);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Node id {0} does not fit in {NODE_ID_BITS} bits")]
pub struct NodeIdOutOfRangeError(pub u16);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum TimestampError {
    #[error("Time lies before the snowflake epoch")]
    BeforeEpoch,
    #[error("Time does not fit in {TIMESTAMP_BITS} timestamp bits")]
    TooLarge,
}

impl NodeId {
    pub fn new(id: u16) -> Result<Self, NodeIdOutOfRangeError> {
        if u64::from(id) < 1 << NODE_ID_BITS {
            Ok(Self(id))
        } else {
            Err(NodeIdOutOfRangeError(id))
        }
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl Sequence {
    #[must_use]
    fn wrapping_next(self) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self((self.0 + 1) % (1 << SEQUENCE_BITS) as u16)
    }
}

fn timestamp_millis(time: UtcDateTime) -> Result<u64, TimestampError> {
    let millis = (time - EPOCH).whole_milliseconds();
    if millis < 0 {
        return Err(TimestampError::BeforeEpoch);
    }
    let millis = u64::try_from(millis).map_err(|_| TimestampError::TooLarge)?;
    if millis < 1 << TIMESTAMP_BITS {
        Ok(millis)
    } else {
        Err(TimestampError::TooLarge)
    }
}

impl Snowflake {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn from_parts(
        time: UtcDateTime,
        node_id: NodeId,
        sequence: Sequence,
    ) -> Result<Self, TimestampError> {
        let millis = timestamp_millis(time)?;
        Ok(Self(
            millis << TIMESTAMP_SHIFT
                | u64::from(node_id.0) << NODE_ID_SHIFT
                | u64::from(sequence.0),
        ))
    }

    #[must_use]
    pub fn node_id(self) -> NodeId {
        #[allow(clippy::cast_possible_truncation)]
        NodeId((self.0 >> NODE_ID_SHIFT) as u16 & ((1 << NODE_ID_BITS) - 1) as u16)
    }

    /// The creation time encoded in the id.
    #[must_use]
    pub fn created_at(self) -> UtcDateTime {
        let millis = self.0 >> TIMESTAMP_SHIFT;
        #[allow(clippy::cast_possible_wrap)]
        {
            EPOCH + Duration::milliseconds(millis as i64)
        }
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(value: Snowflake) -> Self {
        value.get()
    }
}

/// Hands out ids for one node. Not thread safe on its own; callers put it
/// behind a lock.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator {
    node_id: NodeId,
    next_sequence: Sequence,
}

impl SnowflakeGenerator {
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            next_sequence: Sequence::default(),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn generate_at(&mut self, time: UtcDateTime) -> Result<Snowflake, TimestampError> {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.wrapping_next();
        Snowflake::from_parts(time, self.node_id, sequence)
    }

    pub fn generate(&mut self) -> Result<Snowflake, TimestampError> {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EPOCH, NodeId, Snowflake, SnowflakeGenerator, TIMESTAMP_BITS, TimestampError,
        timestamp_millis,
    };
    use time::{Duration, macros::utc_datetime};

    #[test]
    fn node_id_range() {
        assert!(NodeId::new(0).is_ok());
        assert!(NodeId::new(0x3FF).is_ok());
        assert!(NodeId::new(0x400).is_err());
        assert!(NodeId::new(u16::MAX).is_err());
    }

    #[test]
    fn timestamp_bounds() {
        assert_eq!(timestamp_millis(EPOCH), Ok(0));
        assert_eq!(
            timestamp_millis(EPOCH - Duration::milliseconds(1)),
            Err(TimestampError::BeforeEpoch)
        );
        assert_eq!(
            timestamp_millis(EPOCH + Duration::milliseconds((1 << TIMESTAMP_BITS) - 1)),
            Ok((1 << TIMESTAMP_BITS) - 1)
        );
        assert_eq!(
            timestamp_millis(EPOCH + Duration::milliseconds(1 << TIMESTAMP_BITS)),
            Err(TimestampError::TooLarge)
        );
    }

    #[test]
    fn round_trips_creation_time() {
        let time = utc_datetime!(2025-06-15 12:30);
        let node_id = NodeId::new(23).unwrap();

        let mut generator = SnowflakeGenerator::new(node_id);
        let snowflake = generator.generate_at(time).unwrap();

        assert_eq!(snowflake.created_at(), time);
        assert_eq!(snowflake.node_id(), node_id);
    }

    #[test]
    fn sequence_orders_ids_within_one_millisecond() {
        let time = utc_datetime!(2025-06-15 12:30);
        let mut generator = SnowflakeGenerator::new(NodeId::new(0).unwrap());

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();

        assert!(first < second);
        assert_eq!(first.created_at(), second.created_at());
    }

    #[test]
    fn later_time_always_wins_over_sequence() {
        let time = utc_datetime!(2025-06-15 12:30);
        let mut generator = SnowflakeGenerator::new(NodeId::new(0x3FF).unwrap());

        // Exhaust a full sequence cycle at one instant.
        let mut last = generator.generate_at(time).unwrap();
        for _ in 0..(1 << 12) - 1 {
            last = generator.generate_at(time).unwrap();
        }
        let next_millisecond = generator
            .generate_at(time + Duration::milliseconds(1))
            .unwrap();

        assert!(last < next_millisecond);
    }

    #[test]
    fn raw_round_trip() {
        let snowflake = Snowflake::new(3_416_751_341_570_822_244);
        assert_eq!(u64::from(snowflake), 3_416_751_341_570_822_244);
        assert_eq!(Snowflake::from(42u64).get(), 42);
    }
}
