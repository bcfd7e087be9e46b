//! Compression of dense day x time preference grids into time blocks.

use crate::error::{Result, SolverError};
use crate::model::{PreferenceLevel, TimeBlock, TimeLocation, DAYS_PER_WEEK, DAY_CODES};
use crate::source::TimeGridRecord;

/// A preference grid with one row per day (Monday first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceGrid {
    pub first_slot: u16,
    pub slots_per_cell: u16,
    pub break_time: u16,
    cells: Vec<Vec<PreferenceLevel>>,
}

impl PreferenceGrid {
    /// Creates an all-neutral grid.
    pub fn neutral(first_slot: u16, slots_per_cell: u16, nr_days: usize, nr_times: usize) -> Self {
        Self {
            first_slot,
            slots_per_cell,
            break_time: 0,
            cells: vec![vec![PreferenceLevel::Neutral; nr_times]; nr_days],
        }
    }

    pub fn from_record(record: &TimeGridRecord) -> Result<Self> {
        if record.rows.len() > DAYS_PER_WEEK {
            return Err(SolverError::InconsistentData {
                message: format!("time grid has {} days", record.rows.len()),
            });
        }
        if record.slots_per_cell == 0 {
            return Err(SolverError::InconsistentData {
                message: "time grid cell has no slots".to_string(),
            });
        }
        let mut cells = Vec::with_capacity(record.rows.len());
        for row in &record.rows {
            let levels = row
                .chars()
                .map(|c| {
                    PreferenceLevel::from_char(c).ok_or_else(|| SolverError::InconsistentData {
                        message: format!("invalid time preference '{}' in grid row {}", c, row),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            cells.push(levels);
        }
        let width = cells.first().map(|r| r.len()).unwrap_or(0);
        if cells.iter().any(|r| r.len() != width) {
            return Err(SolverError::InconsistentData {
                message: "time grid rows differ in length".to_string(),
            });
        }
        let end = u16::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(record.slots_per_cell))
            .and_then(|span| span.checked_add(record.first_slot));
        if end.is_none() {
            return Err(SolverError::InconsistentData {
                message: format!(
                    "time grid of {} cells from slot {} runs past the slot range",
                    width, record.first_slot
                ),
            });
        }
        Ok(Self {
            first_slot: record.first_slot,
            slots_per_cell: record.slots_per_cell,
            break_time: record.break_time,
            cells,
        })
    }

    pub fn nr_days(&self) -> usize {
        self.cells.len()
    }

    pub fn nr_times(&self) -> usize {
        self.cells.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn get(&self, day: usize, time: usize) -> PreferenceLevel {
        self.cells[day][time]
    }

    pub fn set(&mut self, day: usize, time: usize, level: PreferenceLevel) {
        self.cells[day][time] = level;
    }

    pub fn start_slot(&self, time: usize) -> u16 {
        let time = u16::try_from(time).unwrap_or(u16::MAX);
        self.first_slot.saturating_add(time.saturating_mul(self.slots_per_cell))
    }

    /// Greedy rectangle merging. From each unvisited non-neutral cell the run
    /// is extended to the right over unvisited cells of the same level, then
    /// downwards over following days while the whole row segment is unvisited
    /// and matches exactly. Every non-neutral cell ends up in exactly one block.
    pub fn compress(&self) -> Vec<TimeBlock> {
        let nr_days = self.nr_days();
        let nr_times = self.nr_times();
        let mut visited = vec![vec![false; nr_times]; nr_days];
        let mut blocks = Vec::new();

        for day in 0..nr_days {
            for time in 0..nr_times {
                if visited[day][time] {
                    continue;
                }
                visited[day][time] = true;
                let level = self.get(day, time);
                if level.is_neutral() {
                    continue;
                }

                let mut end_time = time;
                while end_time + 1 < nr_times
                    && !visited[day][end_time + 1]
                    && self.get(day, end_time + 1) == level
                {
                    end_time += 1;
                }

                let mut end_day = day;
                while end_day + 1 < nr_days
                    && (time..=end_time).all(|t| !visited[end_day + 1][t] && self.get(end_day + 1, t) == level)
                {
                    end_day += 1;
                }

                let mut day_code = 0u8;
                for d in day..=end_day {
                    day_code |= DAY_CODES[d];
                    for t in time..=end_time {
                        visited[d][t] = true;
                    }
                }

                let start = self.start_slot(time);
                let length = (self.start_slot(end_time) - start).saturating_add(self.slots_per_cell);
                let mut location = TimeLocation::new(day_code, start, length);
                location.break_time = self.break_time;
                blocks.push(TimeBlock::new(location, level));
            }
        }
        blocks
    }

    /// Paints blocks back onto a neutral grid of the same shape.
    pub fn expand<'a>(&self, blocks: impl IntoIterator<Item = &'a TimeBlock>) -> PreferenceGrid {
        let mut grid = PreferenceGrid::neutral(self.first_slot, self.slots_per_cell, self.nr_days(), self.nr_times());
        grid.break_time = self.break_time;
        for block in blocks {
            for day in 0..grid.nr_days() {
                if block.time.days & DAY_CODES[day] == 0 {
                    continue;
                }
                for time in 0..grid.nr_times() {
                    let start = grid.start_slot(time);
                    let end = start.saturating_add(grid.slots_per_cell);
                    if start >= block.time.start_slot && end <= block.time.end_slot() {
                        grid.set(day, time, block.level);
                    }
                }
            }
        }
        grid
    }
}
