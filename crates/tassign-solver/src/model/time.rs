//! Week time grid: locations, preference blocks and availability patterns.

use serde::{Deserialize, Serialize};

use super::preference::{PreferenceCombination, PreferenceLevel, NOT_AVAILABLE_CHAR};

/// Number of days in the week grid.
pub const DAYS_PER_WEEK: usize = 7;
/// Number of slots in one day.
pub const SLOTS_PER_DAY: usize = 288;
/// Length of one slot in minutes.
pub const SLOT_LENGTH_MIN: usize = 5;
/// Day bits, Monday first.
pub const DAY_CODES: [u8; DAYS_PER_WEEK] = [64, 32, 16, 8, 4, 2, 1];

const DAY_NAMES_SHORT: [&str; DAYS_PER_WEEK] = ["M", "T", "W", "Th", "F", "S", "Su"];

/// A weekly meeting time: days, first slot and number of slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeLocation {
    /// Day bit mask, see [`DAY_CODES`].
    pub days: u8,
    pub start_slot: u16,
    /// Number of slots covered.
    pub length: u16,
    /// Minutes of break at the end of the meeting.
    #[serde(default)]
    pub break_time: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_pattern: Option<String>,
}

impl TimeLocation {
    pub fn new(days: u8, start_slot: u16, length: u16) -> Self {
        Self {
            days,
            start_slot,
            length,
            break_time: 0,
            date_pattern: None,
        }
    }

    /// First slot after the meeting, saturating at `u16::MAX`.
    pub fn end_slot(&self) -> u16 {
        self.start_slot.saturating_add(self.length)
    }

    /// `None` when start and length do not fit the slot range.
    pub fn checked_end_slot(&self) -> Option<u16> {
        self.start_slot.checked_add(self.length)
    }

    /// Whether the two times share a day and their slot ranges intersect.
    pub fn overlaps(&self, other: &TimeLocation) -> bool {
        (self.days & other.days) != 0
            && self.start_slot < other.end_slot()
            && other.start_slot < self.end_slot()
    }

    /// Iterates over the week-grid slots covered, as `day * SLOTS_PER_DAY + slot`.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        DAY_CODES
            .iter()
            .enumerate()
            .filter(move |(_, code)| self.days & **code != 0)
            .flat_map(move |(day, _)| {
                let start = self.start_slot as usize;
                let end = (self.end_slot() as usize).min(SLOTS_PER_DAY);
                (start..end).map(move |slot| day * SLOTS_PER_DAY + slot)
            })
    }

    /// Day header such as `MWF`.
    pub fn day_header(&self) -> String {
        DAY_CODES
            .iter()
            .zip(DAY_NAMES_SHORT.iter())
            .filter(|(code, _)| self.days & **code != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn start_time(&self, use_am_pm: bool) -> String {
        format_minutes(self.start_slot as usize * SLOT_LENGTH_MIN, use_am_pm)
    }

    pub fn end_time(&self, use_am_pm: bool) -> String {
        let minutes = (self.end_slot() as usize * SLOT_LENGTH_MIN).saturating_sub(self.break_time as usize);
        format_minutes(minutes, use_am_pm)
    }

    /// Display name such as `MWF 8:30a - 9:20a`.
    pub fn name(&self, use_am_pm: bool) -> String {
        format!(
            "{} {} - {}",
            self.day_header(),
            self.start_time(use_am_pm),
            self.end_time(use_am_pm)
        )
    }
}

fn format_minutes(minutes: usize, use_am_pm: bool) -> String {
    let hour = (minutes / 60) % 24;
    let min = minutes % 60;
    if use_am_pm {
        let h12 = if hour % 12 == 0 { 12 } else { hour % 12 };
        format!("{}:{:02}{}", h12, min, if hour < 12 { "a" } else { "p" })
    } else {
        format!("{:02}:{:02}", hour, min)
    }
}

/// Class whose committed meeting produced a hard-unavailability block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockSource {
    pub class_id: i64,
    pub label: String,
}

/// A rectangle of the week grid carrying one preference level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeBlock {
    #[serde(flatten)]
    pub time: TimeLocation,
    pub level: PreferenceLevel,
    /// Set when the block is hard unavailability derived from a committed class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BlockSource>,
}

impl TimeBlock {
    pub fn new(time: TimeLocation, level: PreferenceLevel) -> Self {
        Self {
            time,
            level,
            source: None,
        }
    }

    /// Hard unavailability caused by a committed class meeting.
    pub fn unavailable(time: TimeLocation, class_id: i64, label: impl Into<String>) -> Self {
        Self {
            time,
            level: PreferenceLevel::Prohibited,
            source: Some(BlockSource {
                class_id,
                label: label.into(),
            }),
        }
    }

    pub fn is_unavailability(&self) -> bool {
        self.level.is_prohibited() && self.source.is_some()
    }

    /// Sort key `ddd:sssss` for display ordering.
    pub fn comparable(&self) -> String {
        format!("{:03}:{:05}", self.time.days, self.time.start_slot)
    }
}

/// Renders a set of blocks as a 7 x 288 character availability pattern.
///
/// Overlapping blocks combine with the most-restrictive rule; any
/// hard-unavailability block prints [`NOT_AVAILABLE_CHAR`] regardless of the
/// soft preferences underneath.
pub fn availability_pattern<'a>(blocks: impl IntoIterator<Item = &'a TimeBlock>) -> String {
    let mut cells = vec![(PreferenceCombination::new(), false); DAYS_PER_WEEK * SLOTS_PER_DAY];
    for block in blocks {
        for slot in block.time.slots() {
            let cell = &mut cells[slot];
            cell.0.add_level(block.level);
            if block.is_unavailability() {
                cell.1 = true;
            }
        }
    }
    cells
        .iter()
        .map(|(comb, unavailable)| {
            if *unavailable {
                NOT_AVAILABLE_CHAR
            } else {
                comb.level().as_char()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let mwf = TimeLocation::new(64 | 16 | 4, 102, 12);
        let tth = TimeLocation::new(32 | 8, 102, 18);
        let mon_later = TimeLocation::new(64, 110, 6);
        assert!(!mwf.overlaps(&tth));
        assert!(mwf.overlaps(&mon_later));
        assert!(!mwf.overlaps(&TimeLocation::new(64, 114, 6)));
    }

    #[test]
    fn test_slots_cover_each_day() {
        let time = TimeLocation::new(64 | 1, 10, 2);
        let slots: Vec<usize> = time.slots().collect();
        assert_eq!(slots, vec![10, 11, 6 * SLOTS_PER_DAY + 10, 6 * SLOTS_PER_DAY + 11]);
    }

    #[test]
    fn test_time_name() {
        let mut time = TimeLocation::new(64 | 16 | 4, 102, 12);
        time.break_time = 10;
        assert_eq!(time.name(true), "MWF 8:30a - 9:20a");
        assert_eq!(time.name(false), "MWF 08:30 - 09:20");
        assert_eq!(TimeLocation::new(32 | 8, 156, 18).day_header(), "TTh");
    }

    #[test]
    fn test_end_slot_does_not_overflow() {
        let time = TimeLocation::new(64, u16::MAX - 2, 12);
        assert_eq!(time.end_slot(), u16::MAX);
        assert_eq!(time.checked_end_slot(), None);
        assert_eq!(TimeLocation::new(64, 102, 12).checked_end_slot(), Some(114));
        assert!(time.overlaps(&TimeLocation::new(64, u16::MAX - 1, 1)));
        assert!(time.slots().next().is_none());
    }

    #[test]
    fn test_unavailability_overrides_soft_preference() {
        let soft = TimeBlock::new(TimeLocation::new(64, 18, 1), PreferenceLevel::Preferred);
        let committed = TimeBlock::unavailable(TimeLocation::new(64, 18, 1), 7, "MATH 101 Lec 1");
        let pattern = availability_pattern([&soft]);
        assert_eq!(pattern.chars().nth(18), Some('1'));
        let pattern = availability_pattern([&soft, &committed]);
        assert_eq!(pattern.len(), DAYS_PER_WEEK * SLOTS_PER_DAY);
        assert_eq!(pattern.chars().nth(18), Some(NOT_AVAILABLE_CHAR));
        assert_eq!(pattern.chars().nth(19), Some('2'));
    }
}
