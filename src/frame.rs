//! # Frame Data Module
//!
//! Fixed-shape sample storage shared by the sampler and the writer.
//!
//! ## Key Types
//! - `Sample`: Borrowed view of one timestamped reading across all channels
//! - `Frame`: `samples_per_frame` consecutive samples, the unit of persistence
//! - `FrameBuffer`: The sampler's reusable fill buffer; completed frames are
//!   copied out of it with [`FrameBuffer::snapshot`]
//!
//! ## Text Format
//! ```text
//! Time (ms),Vref,Channel1,Channel2,Channel3     <- once per new file
//! 1042,26312,1180,977,3
//! 1062,26310,1185,980,2
//! ```
//! One line per sample, frames concatenated with no separator.

use std::fmt::Write as _;
use std::io::{self, Write};

/// One timestamped reading across all channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample<'a> {
    pub timestamp_ms: u64,
    /// Raw ADC codes, reference channel first
    pub values: &'a [i32],
}

/// A completed batch of samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    channel_count: usize,
    timestamps: Vec<u64>,
    values: Vec<i32>,
}

impl Frame {
    fn zeroed(samples_per_frame: usize, channel_count: usize) -> Self {
        Self {
            channel_count,
            timestamps: vec![0; samples_per_frame],
            values: vec![0; samples_per_frame * channel_count],
        }
    }

    /// Build a frame from `(timestamp, values)` rows. Rows must all have the same width.
    #[cfg(test)]
    pub fn from_rows(rows: &[(u64, Vec<i32>)]) -> Self {
        let channel_count = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut frame = Self::zeroed(rows.len(), channel_count);
        for (idx, (timestamp, values)) in rows.iter().enumerate() {
            assert_eq!(values.len(), channel_count, "ragged frame rows");
            frame.timestamps[idx] = *timestamp;
            frame.values[idx * channel_count..(idx + 1) * channel_count].copy_from_slice(values);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn sample(&self, idx: usize) -> Option<Sample<'_>> {
        let timestamp_ms = *self.timestamps.get(idx)?;
        let start = idx * self.channel_count;
        Some(Sample {
            timestamp_ms,
            values: &self.values[start..start + self.channel_count],
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample<'_>> + '_ {
        (0..self.len()).filter_map(move |idx| self.sample(idx))
    }

    /// Render the frame as CSV lines
    pub fn to_csv(&self) -> String {
        // ~6 chars per field is typical for 16-bit codes and ms timestamps
        let mut block = String::with_capacity(self.len() * (self.channel_count + 1) * 6);
        for sample in self.samples() {
            let _ = write!(block, "{}", sample.timestamp_ms);
            for value in sample.values {
                let _ = write!(block, ",{}", value);
            }
            block.push('\n');
        }
        block
    }

    /// Append the frame to `out` with a single write
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.to_csv().as_bytes())
    }
}

/// Header line written once at the top of a new recording file
pub fn csv_header(channel_count: usize) -> String {
    let mut header = String::from("Time (ms)");
    for channel in 0..channel_count {
        if channel == 0 {
            header.push_str(",Vref");
        } else {
            let _ = write!(header, ",Channel{}", channel);
        }
    }
    header.push('\n');
    header
}

/// Reusable fill buffer owned by the sampler
pub struct FrameBuffer {
    frame: Frame,
}

impl FrameBuffer {
    pub fn new(samples_per_frame: usize, channel_count: usize) -> Self {
        Self {
            frame: Frame::zeroed(samples_per_frame, channel_count),
        }
    }

    pub fn samples_per_frame(&self) -> usize {
        self.frame.len()
    }

    pub fn channel_count(&self) -> usize {
        self.frame.channel_count
    }

    /// Timestamp and channel slots of sample `idx`
    pub fn slot_mut(&mut self, idx: usize) -> (&mut u64, &mut [i32]) {
        let width = self.frame.channel_count;
        let values = &mut self.frame.values[idx * width..(idx + 1) * width];
        (&mut self.frame.timestamps[idx], values)
    }

    /// Copy the current contents out as an owned frame
    pub fn snapshot(&self) -> Frame {
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_for_four_channels() {
        assert_eq!(csv_header(4), "Time (ms),Vref,Channel1,Channel2,Channel3\n");
        assert_eq!(csv_header(2), "Time (ms),Vref,Channel1\n");
    }

    #[test]
    fn test_frame_csv_lines() {
        let frame = Frame::from_rows(&[(10, vec![1, 2, 3, 4]), (30, vec![5, -6, 7, 8])]);
        assert_eq!(frame.to_csv(), "10,1,2,3,4\n30,5,-6,7,8\n");

        let mut out = Vec::new();
        frame.write_csv(&mut out).unwrap();
        frame.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_buffer_snapshot_is_a_copy() {
        let mut buffer = FrameBuffer::new(2, 3);
        {
            let (ts, values) = buffer.slot_mut(1);
            *ts = 99;
            values.copy_from_slice(&[7, 8, 9]);
        }
        let frame = buffer.snapshot();

        let (ts, values) = buffer.slot_mut(1);
        *ts = 0;
        values[0] = 0;

        let sample = frame.sample(1).unwrap();
        assert_eq!(sample.timestamp_ms, 99);
        assert_eq!(sample.values, &[7, 8, 9]);
        assert!(frame.sample(2).is_none());
    }
}
