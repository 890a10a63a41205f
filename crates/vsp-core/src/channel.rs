//! Channel model and device record parsing
//!
//! The sensor emits one comma-separated line per sample tick. Which field
//! carries which channel depends on the deployment, so records are decoded
//! through an explicit [`ChannelMap`] instead of a fixed column order.

use crate::error::{VspError, VspResult};
use serde::{Deserialize, Serialize};

/// Physical channels the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Single-lead ECG (analog front end)
    Ecg,
    /// PPG infrared LED
    Ir,
    /// PPG red LED
    Red,
}

impl Channel {
    /// All channels in their canonical order
    pub const ALL: [Channel; 3] = [Channel::Ecg, Channel::Ir, Channel::Red];

    /// True for the optical (PPG) channels
    pub fn is_ppg(&self) -> bool {
        matches!(self, Channel::Ir | Channel::Red)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Ecg => write!(f, "ECG"),
            Channel::Ir => write!(f, "IR"),
            Channel::Red => write!(f, "Red"),
        }
    }
}

/// Mapping from record fields to channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMap {
    /// (channel, zero-based field index) pairs, in output order
    pub fields: Vec<(Channel, usize)>,
    /// Optional field carrying a device timestamp
    pub timestamp_field: Option<usize>,
}

impl ChannelMap {
    /// Create a map without a timestamp field
    pub fn new(fields: Vec<(Channel, usize)>) -> Self {
        ChannelMap {
            fields,
            timestamp_field: None,
        }
    }

    /// Combined capture layout: `ecg,ir,red`
    pub fn ecg_ir_red() -> Self {
        Self::new(vec![(Channel::Ecg, 0), (Channel::Ir, 1), (Channel::Red, 2)])
    }

    /// PPG-only layout: `ir,red`
    pub fn ir_red() -> Self {
        Self::new(vec![(Channel::Ir, 0), (Channel::Red, 1)])
    }

    /// Add a timestamp field
    pub fn with_timestamp(mut self, field: usize) -> Self {
        self.timestamp_field = Some(field);
        self
    }

    /// Number of fields a record must carry to be decodable
    pub fn required_fields(&self) -> usize {
        self.fields
            .iter()
            .map(|(_, field)| *field)
            .chain(self.timestamp_field)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Field index mapped to a channel
    pub fn field_of(&self, channel: Channel) -> Option<usize> {
        self.fields
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, field)| *field)
    }

    /// Channels in output order
    pub fn channels(&self) -> Vec<Channel> {
        self.fields.iter().map(|(c, _)| *c).collect()
    }

    /// Check for duplicate channels or duplicate field indices
    pub fn validate(&self) -> VspResult<()> {
        if self.fields.is_empty() {
            return Err(VspError::configuration("Channel map has no channels"));
        }

        let mut used_fields: Vec<usize> = self.timestamp_field.into_iter().collect();
        let mut seen_channels = Vec::with_capacity(self.fields.len());

        for (channel, field) in &self.fields {
            if seen_channels.contains(channel) {
                return Err(VspError::configuration(format!(
                    "Channel {} is mapped more than once",
                    channel
                )));
            }
            if used_fields.contains(field) {
                return Err(VspError::configuration(format!(
                    "Field {} is mapped more than once",
                    field
                )));
            }
            seen_channels.push(*channel);
            used_fields.push(*field);
        }

        if used_fields.len() < 2 {
            return Err(VspError::configuration(
                "Records must map at least two fields",
            ));
        }

        Ok(())
    }

    /// Decode one device line into a record
    pub fn parse(&self, line: &str) -> VspResult<SampleRecord> {
        let line = line.trim();
        if line.is_empty() || !line.contains(',') {
            return Err(VspError::malformed("record is not comma separated"));
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let required = self.required_fields().max(2);
        if parts.len() < required {
            return Err(VspError::malformed(format!(
                "expected at least {} fields, got {}",
                required,
                parts.len()
            )));
        }

        let timestamp = match self.timestamp_field {
            Some(field) => Some(parse_field(parts[field], field)?),
            None => None,
        };

        let values = self
            .fields
            .iter()
            .map(|(channel, field)| Ok((*channel, parse_field(parts[*field], *field)?)))
            .collect::<VspResult<Vec<_>>>()?;

        Ok(SampleRecord { timestamp, values })
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::ecg_ir_red()
    }
}

fn parse_field(text: &str, field: usize) -> VspResult<f64> {
    let value: f64 = text
        .parse()
        .map_err(|_| VspError::malformed(format!("field {} ('{}') is not numeric", field, text)))?;

    if !value.is_finite() {
        return Err(VspError::malformed(format!("field {} is not finite", field)));
    }
    Ok(value)
}

/// One decoded sample tick
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Device timestamp if the map carries one
    pub timestamp: Option<f64>,
    /// One value per mapped channel, in map order
    pub values: Vec<(Channel, f64)>,
}

impl SampleRecord {
    /// Value for a channel, if present in this record
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.values
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_layout() {
        let map = ChannelMap::default();
        let record = map.parse("1843,51234,48710\r\n").unwrap();

        assert_eq!(record.timestamp, None);
        assert_eq!(record.value(Channel::Ecg), Some(1843.0));
        assert_eq!(record.value(Channel::Ir), Some(51234.0));
        assert_eq!(record.value(Channel::Red), Some(48710.0));
    }

    #[test]
    fn test_parse_custom_order_with_timestamp() {
        let map = ChannelMap::new(vec![(Channel::Red, 2), (Channel::Ir, 1)]).with_timestamp(0);
        let record = map.parse("1200345, 900.5, 700.25").unwrap();

        assert_eq!(record.timestamp, Some(1200345.0));
        assert_eq!(record.value(Channel::Ir), Some(900.5));
        assert_eq!(record.value(Channel::Red), Some(700.25));
        assert_eq!(record.value(Channel::Ecg), None);
        assert_eq!(record.values[0].0, Channel::Red);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let map = ChannelMap::ir_red();
        let record = map.parse("10,20,30,40").unwrap();
        assert_eq!(record.values, vec![(Channel::Ir, 10.0), (Channel::Red, 20.0)]);
    }

    #[test]
    fn test_malformed_records() {
        let map = ChannelMap::default();

        for line in ["", "   ", "1843", "1843,5000", "1843,abc,5000", "1,2,NaN", "boot ok"] {
            let result = map.parse(line);
            assert!(
                matches!(result, Err(VspError::MalformedSample { .. })),
                "line {:?} should be rejected",
                line
            );
        }
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(ChannelMap::default().required_fields(), 3);
        assert_eq!(ChannelMap::ir_red().with_timestamp(4).required_fields(), 5);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        assert!(ChannelMap::default().validate().is_ok());

        let duplicate_channel = ChannelMap::new(vec![(Channel::Ir, 0), (Channel::Ir, 1)]);
        assert!(duplicate_channel.validate().is_err());

        let duplicate_field = ChannelMap::new(vec![(Channel::Ir, 0), (Channel::Red, 0)]);
        assert!(duplicate_field.validate().is_err());

        let timestamp_clash = ChannelMap::ir_red().with_timestamp(1);
        assert!(timestamp_clash.validate().is_err());

        let single_field = ChannelMap::new(vec![(Channel::Ecg, 0)]);
        assert!(single_field.validate().is_err());
    }
}
