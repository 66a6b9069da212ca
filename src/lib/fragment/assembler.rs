//! Pairs mates from a coordinate-sorted record stream into fragments.
//!
//! In coordinate order the two mates of a pair are usually close together but not adjacent,
//! so the first mate seen waits in a name-keyed buffer until its partner arrives. A pair is
//! complete only once its second mate is read, which can be long after fragments starting
//! further downstream were completed. Completed fragments are therefore held in a reorder
//! buffer keyed by stream position and released only when no waiting mate on the current
//! contig starts earlier, so the output stays sorted by fragment start.
//!
//! Mates whose partner never shows up (filtered, secondary-only, or on another contig) are
//! released as single-read fragments at the end of the input. Waiting mates from an earlier
//! contig can still be paired but no longer hold back release.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashMap;
use log::debug;

use crate::errors::Result;
use crate::fragment::{Fragment, FragmentOptions};
use crate::record::AlignmentRecord;

/// Stream position of a record: rank of its contig in order of appearance, then 0-based start.
type Position = (usize, usize);

/// Iterator adapter turning records into [`Fragment`]s, in fragment start order.
pub struct FragmentAssembler<I, R>
where
    I: Iterator<Item = R>,
    R: AlignmentRecord,
{
    records: I,
    options: FragmentOptions,
    contigs: AHashMap<String, usize>,
    position: Position,
    waiting: AHashMap<Vec<u8>, (Position, R)>,
    /// Names of waiting mates on the current contig, in arrival order
    waiting_order: VecDeque<Vec<u8>>,
    /// Names of waiting mates left behind on earlier contigs
    carried: Vec<Vec<u8>>,
    /// Completed fragments keyed by position and arrival serial
    ready: BTreeMap<(Position, u64), Result<Fragment<R>>>,
    serial: u64,
    exhausted: bool,
    skipped: u64,
    high_water_mark: usize,
}

impl<I, R> FragmentAssembler<I, R>
where
    I: Iterator<Item = R>,
    R: AlignmentRecord,
{
    /// Creates an assembler over `records`.
    pub fn new(records: I, options: FragmentOptions) -> Self {
        Self {
            records,
            options,
            contigs: AHashMap::new(),
            position: (0, 0),
            waiting: AHashMap::new(),
            waiting_order: VecDeque::new(),
            carried: Vec::new(),
            ready: BTreeMap::new(),
            serial: 0,
            exhausted: false,
            skipped: 0,
            high_water_mark: 0,
        }
    }

    /// Number of secondary or supplementary records skipped so far.
    #[must_use]
    pub fn skipped_records(&self) -> u64 {
        self.skipped
    }

    /// Largest number of mates that were waiting for their partner at once.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Builds a fragment from two mates, read 1 first.
    fn pair(&self, first: R, second: R) -> Result<Fragment<R>> {
        if second.is_read1() && !first.is_read1() {
            Fragment::new(Some(second), Some(first), self.options.clone())
        } else {
            Fragment::new(Some(first), Some(second), self.options.clone())
        }
    }

    fn single(&self, record: R) -> Result<Fragment<R>> {
        Fragment::from_records(vec![record], self.options.clone())
    }

    /// Position of `record`, advancing the stream position when the record is placed.
    /// Unplaced records inherit the position of the record before them.
    fn locate(&mut self, record: &R) -> Position {
        let (Some(contig), Some(start)) = (record.reference_name(), record.reference_start())
        else {
            return self.position;
        };
        let rank = if let Some(&rank) = self.contigs.get(contig) {
            rank
        } else {
            let rank = self.contigs.len();
            self.contigs.insert(contig.to_string(), rank);
            rank
        };
        if rank != self.position.0 {
            self.carried.extend(self.waiting_order.drain(..));
        }
        self.position = (rank, start);
        self.position
    }

    fn hold(&mut self, position: Position, fragment: Result<Fragment<R>>) {
        self.ready.insert((position, self.serial), fragment);
        self.serial += 1;
    }

    /// Position of the earliest mate on the current contig still waiting for its partner.
    fn earliest_waiting(&mut self) -> Option<Position> {
        while let Some(name) = self.waiting_order.front() {
            match self.waiting.get(name) {
                Some((position, _)) => return Some(*position),
                None => {
                    self.waiting_order.pop_front();
                }
            }
        }
        None
    }

    /// Next completed fragment that no waiting mate can precede.
    fn release(&mut self) -> Option<Result<Fragment<R>>> {
        let ((position, _), _) = self.ready.first_key_value()?;
        let position = *position;
        if !self.exhausted && self.earliest_waiting().is_some_and(|waiting| waiting < position) {
            return None;
        }
        self.ready.pop_first().map(|(_, fragment)| fragment)
    }

    fn drain_waiting(&mut self) {
        let names: Vec<Vec<u8>> =
            self.carried.drain(..).chain(self.waiting_order.drain(..)).collect();
        for name in names {
            if let Some((position, record)) = self.waiting.remove(&name) {
                debug!(
                    "Mate of '{}' never arrived, emitting it alone",
                    String::from_utf8_lossy(&name)
                );
                let fragment = self.single(record);
                self.hold(position, fragment);
            }
        }
        self.exhausted = true;
    }
}

impl<I, R> Iterator for FragmentAssembler<I, R>
where
    I: Iterator<Item = R>,
    R: AlignmentRecord,
{
    type Item = Result<Fragment<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.release() {
                return Some(fragment);
            }
            if self.exhausted {
                return None;
            }

            let Some(record) = self.records.next() else {
                self.drain_waiting();
                continue;
            };

            if record.is_secondary() || record.is_supplementary() {
                self.skipped += 1;
                continue;
            }

            let position = self.locate(&record);
            let Some(name) = record.query_name().filter(|_| record.is_paired()).map(<[u8]>::to_vec)
            else {
                let fragment = self.single(record);
                self.hold(position, fragment);
                continue;
            };

            if let Some((mate_position, mate)) = self.waiting.remove(&name) {
                // a pair spanning contigs is released where its second mate sits
                let position = if mate_position.0 == position.0 { mate_position } else { position };
                let fragment = self.pair(mate, record);
                self.hold(position, fragment);
                continue;
            }
            self.waiting_order.push_back(name.clone());
            self.waiting.insert(name, (position, record));
            self.high_water_mark = self.high_water_mark.max(self.waiting.len());
        }
    }
}
