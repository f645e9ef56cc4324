//! Crossword layout generation.
//!
//! Turns an unordered list of candidate words into a set of crossing
//! placements on a fixed grid. The longest word is laid Across through the
//! middle of the grid; every other word must cross something already placed.
//! Each attempt shuffles candidates within length buckets and greedily places
//! them, choosing randomly among the densest placements. The best of many
//! attempts is kept, capped, numbered, and centered.

use std::cmp::Reverse;
use std::collections::HashSet;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};

use crate::normalize::{is_word_token, normalize_guess};
use crate::player::PlayerId;

/// Shortest word the engine accepts from a vocabulary list.
pub const MIN_WORD_LEN: usize = 3;
/// Longest word the engine accepts from a vocabulary list.
pub const MAX_WORD_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    /// (row, col) step along the word.
    fn step(self) -> (isize, isize) {
        match self {
            Self::Across => (0, 1),
            Self::Down => (1, 0),
        }
    }

    /// (row, col) step to the side of the word.
    fn side_step(self) -> (isize, isize) {
        let (dr, dc) = self.step();
        (dc, dr)
    }
}

/// A word placed on the puzzle grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedWord {
    /// Clue number, 1-based, in placement order.
    pub id: u32,
    pub text: String,
    pub direction: Direction,
    pub row: usize,
    pub col: usize,
    pub revealed: bool,
    pub revealed_by: Option<PlayerId>,
}

impl PlacedWord {
    pub fn letter_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Grid cells covered by this word, in reading order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, char)> + '_ {
        let (dr, dc) = match self.direction {
            Direction::Across => (0, 1),
            Direction::Down => (1, 0),
        };
        self.text
            .chars()
            .enumerate()
            .map(move |(i, ch)| (self.row + dr * i, self.col + dc * i, ch))
    }

    /// Last cell covered by this word.
    pub fn end(&self) -> (usize, usize) {
        let last = self.letter_count().saturating_sub(1);
        match self.direction {
            Direction::Across => (self.row, self.col + last),
            Direction::Down => (self.row + last, self.col),
        }
    }
}

/// Tuning knobs for layout generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub rows: usize,
    pub cols: usize,
    /// Hard cap on words in the final layout.
    pub max_words: usize,
    /// Stop searching once an attempt places this many words.
    pub target_words: usize,
    /// Layouts below this size count as a failed generation.
    pub min_words: usize,
    /// Full attempts before settling for the best one.
    pub attempts: usize,
    /// Extra passes over words that could not be placed the first time.
    pub retry_passes: usize,
    /// Placements sampled from among the densest candidates.
    pub top_k: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rows: 20,
            cols: 20,
            max_words: 40,
            target_words: 30,
            min_words: 5,
            attempts: 100,
            retry_passes: 5,
            top_k: 3,
        }
    }
}

impl LayoutConfig {
    /// Whether a generated layout is large enough to play.
    pub fn is_viable(&self, layout: &[PlacedWord]) -> bool {
        layout.len() >= self.min_words
    }
}

/// Normalize raw vocabulary tokens and keep the ones the engine can place:
/// letters only, 3 to 12 long, fitting the grid, first occurrence wins.
pub fn prepare_candidates(raw: &[String], config: &LayoutConfig) -> Vec<String> {
    let max_len = MAX_WORD_LEN.min(config.rows.min(config.cols));
    let mut seen = HashSet::new();
    raw.iter()
        .map(|w| normalize_guess(w))
        .filter(|w| is_word_token(w))
        .filter(|w| (MIN_WORD_LEN..=max_len).contains(&w.chars().count()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    letter: Option<char>,
    across: bool,
    down: bool,
}

impl Cell {
    fn used_by(&self, direction: Direction) -> bool {
        match direction {
            Direction::Across => self.across,
            Direction::Down => self.down,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    row: usize,
    col: usize,
    direction: Direction,
    intersections: usize,
}

/// Scratch grid for one generation attempt.
struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    /// Occupied cells in fill order; each cell appears once.
    filled: Vec<(usize, usize)>,
}

impl Grid {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); rows * cols],
            filled: Vec::new(),
        }
    }

    fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.cols
    }

    fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.cols + col]
    }

    /// Letter at a possibly off-grid position.
    fn letter_at(&self, row: isize, col: isize) -> Option<char> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.cell(row as usize, col as usize).letter
    }

    fn place(&mut self, word: &[char], row: usize, col: usize, direction: Direction) {
        let (dr, dc) = direction.step();
        for (i, &ch) in word.iter().enumerate() {
            let r = (row as isize + dr * i as isize) as usize;
            let c = (col as isize + dc * i as isize) as usize;
            let idx = r * self.cols + c;
            let cell = &mut self.cells[idx];
            if cell.letter.is_none() {
                self.filled.push((r, c));
            }
            cell.letter = Some(ch);
            match direction {
                Direction::Across => cell.across = true,
                Direction::Down => cell.down = true,
            }
        }
    }

    /// Number of crossings if `word` can go at (row, col), `None` if the
    /// placement breaks a layout rule.
    fn evaluate(&self, word: &[char], row: isize, col: isize, direction: Direction) -> Option<usize> {
        let (dr, dc) = direction.step();
        let (sr, sc) = direction.side_step();
        let last = word.len() as isize - 1;
        let (end_r, end_c) = (row + dr * last, col + dc * last);

        if !self.in_bounds(row, col) || !self.in_bounds(end_r, end_c) {
            return None;
        }
        // No word may touch this one end-to-end.
        if self.letter_at(row - dr, col - dc).is_some()
            || self.letter_at(end_r + dr, end_c + dc).is_some()
        {
            return None;
        }

        let mut intersections = 0;
        for (i, &ch) in word.iter().enumerate() {
            let r = row + dr * i as isize;
            let c = col + dc * i as isize;
            let cell = self.cell(r as usize, c as usize);
            match cell.letter {
                Some(existing) => {
                    if existing != ch || cell.used_by(direction) {
                        return None;
                    }
                    intersections += 1;
                },
                None => {
                    if self.letter_at(r - sr, c - sc).is_some()
                        || self.letter_at(r + sr, c + sc).is_some()
                    {
                        return None;
                    }
                },
            }
        }

        (intersections > 0).then_some(intersections)
    }

    /// Every valid crossing placement for `word`.
    fn placements(&self, word: &[char]) -> Vec<Placement> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (i, &ch) in word.iter().enumerate() {
            for &(r, c) in &self.filled {
                if self.cell(r, c).letter != Some(ch) {
                    continue;
                }
                for direction in [Direction::Across, Direction::Down] {
                    let (dr, dc) = direction.step();
                    let row = r as isize - dr * i as isize;
                    let col = c as isize - dc * i as isize;
                    if !seen.insert((row, col, direction)) {
                        continue;
                    }
                    if let Some(intersections) = self.evaluate(word, row, col, direction) {
                        out.push(Placement {
                            row: row as usize,
                            col: col as usize,
                            direction,
                            intersections,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Length bucket; lower sorts first.
fn bucket_of(len: usize) -> usize {
    match len {
        8.. => 0,
        6..=7 => 1,
        4..=5 => 2,
        _ => 3,
    }
}

/// Shuffle within length buckets, longest bucket first.
fn bucketed_order<R: Rng + ?Sized>(words: &[Vec<char>], rng: &mut R) -> Vec<Vec<char>> {
    let mut buckets: [Vec<Vec<char>>; 4] = Default::default();
    for w in words {
        buckets[bucket_of(w.len())].push(w.clone());
    }
    for bucket in &mut buckets {
        bucket.shuffle(rng);
    }
    buckets.into_iter().flatten().collect()
}

struct Attempt {
    grid: Grid,
    placed: Vec<PlacedWord>,
}

impl Attempt {
    fn push(&mut self, word: &[char], row: usize, col: usize, direction: Direction) {
        self.grid.place(word, row, col, direction);
        self.placed.push(PlacedWord {
            id: 0,
            text: word.iter().collect(),
            direction,
            row,
            col,
            revealed: false,
            revealed_by: None,
        });
    }

    /// Place `word` at one of its densest crossings. Returns false if it
    /// has nowhere to go yet.
    fn try_place<R: Rng + ?Sized>(&mut self, word: &[char], top_k: usize, rng: &mut R) -> bool {
        let mut options = self.grid.placements(word);
        if options.is_empty() {
            return false;
        }
        options.sort_by_key(|p| Reverse(p.intersections));
        options.truncate(top_k.max(1));
        let Some(&choice) = options.choose(rng) else {
            return false;
        };
        self.push(word, choice.row, choice.col, choice.direction);
        true
    }
}

/// One full greedy pass. `words` must be sorted longest-first.
fn run_attempt<R: Rng + ?Sized>(
    words: &[Vec<char>],
    config: &LayoutConfig,
    rng: &mut R,
) -> Vec<PlacedWord> {
    let mut attempt = Attempt {
        grid: Grid::new(config.rows, config.cols),
        placed: Vec::new(),
    };
    let Some((anchor, rest)) = words.split_first() else {
        return Vec::new();
    };
    let row = config.rows / 2;
    let col = (config.cols - anchor.len()) / 2;
    attempt.push(anchor, row, col, Direction::Across);

    let mut deferred = Vec::new();
    for word in bucketed_order(rest, rng) {
        if attempt.placed.len() >= config.max_words {
            return attempt.placed;
        }
        if !attempt.try_place(&word, config.top_k, rng) {
            deferred.push(word);
        }
    }

    for _ in 0..config.retry_passes {
        if deferred.is_empty() || attempt.placed.len() >= config.max_words {
            break;
        }
        let before = deferred.len();
        deferred.retain(|word| {
            attempt.placed.len() >= config.max_words
                || !attempt.try_place(word, config.top_k, rng)
        });
        if deferred.len() == before {
            break;
        }
    }

    attempt.placed
}

/// Generate a crossword layout from candidate words.
///
/// Never fails: a poor vocabulary simply yields a short layout, which callers
/// should check with [`LayoutConfig::is_viable`].
pub fn generate_layout<R: Rng + ?Sized>(
    candidates: &[String],
    config: &LayoutConfig,
    rng: &mut R,
) -> Vec<PlacedWord> {
    let fits = config.rows.min(config.cols);
    let mut seen = HashSet::new();
    let mut words: Vec<Vec<char>> = candidates
        .iter()
        .filter(|w| seen.insert(w.as_str()))
        .map(|w| w.chars().collect::<Vec<char>>())
        .filter(|w| !w.is_empty() && w.len() <= fits)
        .collect();
    if words.is_empty() {
        return Vec::new();
    }
    words.sort_by_key(|w| Reverse(w.len()));

    let goal = config.target_words.min(config.max_words).min(words.len());
    let mut best: Vec<PlacedWord> = Vec::new();
    let mut attempts_used = 0;
    for _ in 0..config.attempts.max(1) {
        attempts_used += 1;
        let placed = run_attempt(&words, config, rng);
        if placed.len() > best.len() {
            best = placed;
        }
        if best.len() >= goal {
            break;
        }
    }

    best.truncate(config.max_words);
    for (i, word) in best.iter_mut().enumerate() {
        word.id = i as u32 + 1;
    }
    tracing::debug!(
        candidates = words.len(),
        placed = best.len(),
        attempts = attempts_used,
        "Layout generated"
    );
    center_layout(best, config.rows, config.cols)
}

/// Translate every word so the layout's bounding box sits in the middle of a
/// `rows` x `cols` grid. Relative positions are unchanged.
pub fn center_layout(mut words: Vec<PlacedWord>, rows: usize, cols: usize) -> Vec<PlacedWord> {
    let Some(first) = words.first() else {
        return words;
    };
    let (mut min_r, mut min_c) = (first.row, first.col);
    let (mut max_r, mut max_c) = first.end();
    for w in &words {
        let (er, ec) = w.end();
        min_r = min_r.min(w.row);
        min_c = min_c.min(w.col);
        max_r = max_r.max(er);
        max_c = max_c.max(ec);
    }
    let height = max_r - min_r + 1;
    let width = max_c - min_c + 1;
    let top = rows.saturating_sub(height) / 2;
    let left = cols.saturating_sub(width) / 2;
    for w in &mut words {
        w.row = w.row - min_r + top;
        w.col = w.col - min_c + left;
    }
    words
}
