//! MVT geometry encoding.
//!
//! Turns a command stream (see [`crate::geometry`]) into the packed integer
//! sequence stored in `Feature.geometry`:
//!
//! - **Command words**: `(count << 3) | command_id`, one per run of identical commands
//! - **Delta encoding**: each coordinate is stored relative to the previous emitted one
//! - **Zigzag encoding**: signed deltas are mapped to unsigned integers
//! - **Simplification**: vertices that move less than the tolerance are dropped,
//!   with the last dropped vertex patched back into the output afterwards
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#43-geometry-encoding>

use crate::geometry::{Command, CommandEntry};
use crate::{Error, Result};

/// Largest repeat count that fits in a command word (29 bits).
pub const MAX_COMMAND_COUNT: u32 = (1 << 29) - 1;

// ============================================================================
// Zigzag Encoding
// ============================================================================

/// Encode a signed integer using zigzag encoding.
///
/// Zigzag encoding maps signed integers to unsigned integers so that
/// small negative numbers have small encoded values:
/// - 0 → 0
/// - -1 → 1
/// - 1 → 2
/// - -2 → 3
/// - 2 → 4
/// - etc.
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decode a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

// ============================================================================
// Command Encoding
// ============================================================================

/// Pack a command with a repeat count.
///
/// MVT commands are packed as: `(command_id | (count << 3))`
/// - command_id: 1=MoveTo, 2=LineTo, 7=ClosePath
/// - count: number of times to repeat the command
#[inline]
pub fn command_encode(command_id: u32, count: u32) -> u32 {
    (command_id & 0x7) | (count << 3)
}

/// Unpack a command into (command_id, count).
#[inline]
pub fn command_decode(command: u32) -> (u32, u32) {
    (command & 0x7, command >> 3)
}

// ============================================================================
// Geometry Encoder
// ============================================================================

/// A run of identical commands whose command word is written once the run ends.
#[derive(Debug, Clone, Copy)]
struct Run {
    command: Command,
    /// Index of the placeholder command word.
    index: usize,
    length: u32,
}

/// The most recent vertex dropped by simplification.
#[derive(Debug, Clone, Copy)]
struct SkippedVertex {
    /// Index of the last emitted coordinate pair, rewritten when the skip is resolved.
    patch_index: usize,
    x: i32,
    y: i32,
}

/// Delta/zigzag encoder with movement-tolerance simplification.
///
/// The encoder appends a placeholder word whenever a command run starts and
/// back-fills it when the run ends. When vertices are dropped because they
/// moved less than `tolerance`, the last emitted coordinate pair is later
/// rewritten to land on the last dropped vertex. That happens when a new
/// MoveTo vertex arrives or the stream ends, so the end of a path is never
/// lost to simplification and later deltas start from the true position.
///
/// A tolerance of 0 keeps every vertex.
#[derive(Debug)]
pub struct GeometryEncoder {
    tolerance: u32,
    geometry: Vec<u32>,
    cursor: (i32, i32),
    run: Option<Run>,
    prev_command: Option<Command>,
    last_pair: Option<usize>,
    skipped: Option<SkippedVertex>,
}

impl GeometryEncoder {
    pub fn new(tolerance: u32) -> Self {
        Self {
            tolerance,
            geometry: Vec::new(),
            cursor: (0, 0),
            run: None,
            prev_command: None,
            last_pair: None,
            skipped: None,
        }
    }

    /// Encode a full command stream and return the geometry words.
    pub fn encode(mut self, entries: &[CommandEntry]) -> Result<Vec<u32>> {
        self.geometry.reserve(entries.len() * 2 + 2);

        for (i, entry) in entries.iter().enumerate() {
            if self.run.map(|run| run.command) != Some(entry.command) {
                self.start_run(entry.command)?;
            }

            match entry.command {
                Command::MoveTo | Command::LineTo => self.push_vertex(entry, entries.get(i + 1))?,
                Command::ClosePath => {
                    if self.prev_command != Some(Command::ClosePath) {
                        self.bump_run();
                    }
                }
            }

            self.prev_command = Some(entry.command);
        }

        if let Some(skipped) = self.skipped.take() {
            self.apply_skipped(skipped)?;
        }
        self.finish_run()?;

        Ok(self.geometry)
    }

    fn start_run(&mut self, command: Command) -> Result<()> {
        if self.run.is_none() && command != Command::MoveTo {
            return Err(Error::InternalEncoding(format!(
                "command stream starts with {:?} instead of MoveTo",
                command
            )));
        }

        self.finish_run()?;
        self.run = Some(Run {
            command,
            index: self.geometry.len(),
            length: 0,
        });
        // placeholder, back-filled by finish_run
        self.geometry.push(0);
        Ok(())
    }

    fn finish_run(&mut self) -> Result<()> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        if run.length > MAX_COMMAND_COUNT {
            return Err(Error::InternalEncoding(format!(
                "{:?} run of {} exceeds the command word capacity",
                run.command, run.length
            )));
        }

        let word = self.geometry.get_mut(run.index).ok_or_else(|| {
            Error::InternalEncoding(format!("command word index {} out of range", run.index))
        })?;
        *word = command_encode(run.command.id(), run.length);
        Ok(())
    }

    fn run_length(&self) -> u32 {
        self.run.map_or(0, |run| run.length)
    }

    fn bump_run(&mut self) {
        if let Some(run) = self.run.as_mut() {
            run.length += 1;
        }
    }

    /// True if `next` is a LineTo that steps along exactly one axis by at least
    /// the tolerance. Such corners are kept regardless of their own delta.
    fn sharp_turn_ahead(&self, entry: &CommandEntry, next: Option<&CommandEntry>) -> bool {
        let Some(next) = next else {
            return false;
        };
        if next.command != Command::LineTo {
            return false;
        }

        let tolerance = u64::from(self.tolerance);
        let step_x = (i64::from(next.x) - i64::from(entry.x)).unsigned_abs();
        let step_y = (i64::from(next.y) - i64::from(entry.y)).unsigned_abs();

        (step_x == 0 && step_y >= tolerance) || (step_y == 0 && step_x >= tolerance)
    }

    fn push_vertex(&mut self, entry: &CommandEntry, next: Option<&CommandEntry>) -> Result<()> {
        if entry.command == Command::MoveTo {
            if let Some(skipped) = self.skipped.take() {
                self.apply_skipped(skipped)?;
            }
        }

        let dx = entry.x.wrapping_sub(self.cursor.0);
        let dy = entry.y.wrapping_sub(self.cursor.1);

        let keep = self.run_length() == 0
            || self.sharp_turn_ahead(entry, next)
            || dx.unsigned_abs() >= self.tolerance
            || dy.unsigned_abs() >= self.tolerance;

        if keep {
            self.last_pair = Some(self.geometry.len());
            self.geometry.push(zigzag_encode(dx));
            self.geometry.push(zigzag_encode(dy));
            self.cursor = (entry.x, entry.y);
            self.skipped = None;
            self.bump_run();
        } else {
            let patch_index = self.last_pair.ok_or_else(|| {
                Error::InternalEncoding("vertex skipped before any vertex was emitted".into())
            })?;
            self.skipped = Some(SkippedVertex {
                patch_index,
                x: entry.x,
                y: entry.y,
            });
        }

        Ok(())
    }

    /// Rewrite the last emitted pair so it ends on the skipped vertex.
    fn apply_skipped(&mut self, skipped: SkippedVertex) -> Result<()> {
        let index = skipped.patch_index;
        let (Some(&last_x), Some(&last_y)) = (self.geometry.get(index), self.geometry.get(index + 1))
        else {
            return Err(Error::InternalEncoding(format!(
                "patch index {} out of range for {} words",
                index,
                self.geometry.len()
            )));
        };

        let dx = zigzag_decode(last_x).wrapping_add(skipped.x.wrapping_sub(self.cursor.0));
        let dy = zigzag_decode(last_y).wrapping_add(skipped.y.wrapping_sub(self.cursor.1));

        self.geometry[index] = zigzag_encode(dx);
        self.geometry[index + 1] = zigzag_encode(dy);
        self.cursor = (skipped.x, skipped.y);
        Ok(())
    }
}

/// Encode a command stream with the given simplification tolerance.
pub fn encode_entries(entries: &[CommandEntry], tolerance: u32) -> Result<Vec<u32>> {
    GeometryEncoder::new(tolerance).encode(entries)
}

// ============================================================================
// Tests
// ============================================================================
