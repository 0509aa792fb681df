//! The composite title record.
//!
//! A `TitleRecord` is built from one movies line and filled in by the
//! secondary datasets during the join. Only the structure needed for the
//! join and for carry-forward is recovered from the title key: the partial
//! key `title (year[/numeral])`, the kind, the episode qualifier in braces
//! and the suspended marker. Everything else is kept as text.

use super::codec::{AkaRecord, PlotRecord, RatingRecord, TabbedRecord};
use crate::join::{Composite, Lineage};
use crate::record::Keyed;
use bytes::Bytes;
use memchr::memmem;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// What kind of production a title is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Theatrical release.
    Movie,
    /// Quoted title: a series or one of its episodes.
    TvSeries,
    /// Made for TV, `(TV)`.
    Tv,
    /// Direct to video, `(V)`.
    Video,
    /// Video game, `(VG)`.
    VideoGame,
}

/// The parts of a title key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleParts {
    /// Length of the partial key in bytes.
    pub partial_len: usize,
    /// Year text inside the year group, such as `2001` or `2001/II`.
    pub year: Option<String>,
    /// Text inside the episode braces.
    pub episode: Option<String>,
    /// Whether the title carries the suspended marker.
    pub suspended: bool,
    /// Production kind.
    pub kind: MediaKind,
}

const KIND_QUALIFIERS: [&[u8]; 3] = [b"(TV)", b"(V)", b"(VG)"];

/// Whether `rest` holds nothing but title qualifiers: `(TV)`, `(V)`,
/// `(VG)`, an episode in braces or the suspended marker.
fn only_qualifiers(mut rest: &[u8]) -> bool {
    loop {
        rest = rest.trim_ascii_start();
        if rest.is_empty() {
            return true;
        }

        let end = if rest.starts_with(b"{{") {
            memmem::find(rest, b"}}").map(|close| close + 2)
        } else if rest[0] == b'{' {
            rest.iter().position(|&b| b == b'}').map(|close| close + 1)
        } else {
            KIND_QUALIFIERS.iter().find(|q| rest.starts_with(q)).map(|q| q.len())
        };
        match end {
            Some(end) => rest = &rest[end..],
            None => return false,
        }
    }
}

/// Returns the byte range `(open, close)` of the `(yyyy)` or
/// `(yyyy/roman)` group that is followed only by qualifiers, where `?` may
/// stand for a digit. Year-like groups inside the title itself are skipped.
fn year_group(key: &[u8]) -> Option<(usize, usize)> {
    for (open, _) in key.iter().enumerate().filter(|&(_, &b)| b == b'(') {
        let rest = &key[open + 1..];
        if rest.len() < 5 || !rest[..4].iter().all(|&c| c.is_ascii_digit() || c == b'?') {
            continue;
        }

        let mut len = 4;
        if rest.get(len) == Some(&b'/') {
            len += 1;
            while rest.get(len).is_some_and(|c| b"IVXLivxl".contains(c)) {
                len += 1;
            }
        }
        let close = open + 1 + len;
        if rest.get(len) == Some(&b')') && only_qualifiers(&key[close + 1..]) {
            return Some((open, close));
        }
    }
    None
}

/// Splits a title key into its parts.
pub fn analyze(key: &[u8]) -> TitleParts {
    let (partial_len, year, rest) = match year_group(key) {
        Some((open, close)) => (
            close + 1,
            Some(String::from_utf8_lossy(&key[open + 1..close]).into_owned()),
            &key[close + 1..],
        ),
        None => (key.len(), None, &key[key.len()..]),
    };

    let marker = memmem::find(rest, b"{{SUSPENDED}}")
        .or_else(|| memmem::find(rest, b"{{SUSPENED}}"));
    let qualifiers = &rest[..marker.unwrap_or(rest.len())];

    let episode = memmem::find(qualifiers, b"{").and_then(|open| {
        let close = qualifiers.iter().rposition(|&b| b == b'}')?;
        let inner = qualifiers.get(open + 1..close)?;
        Some(String::from_utf8_lossy(inner).trim().to_string())
    });

    let kind = if key.first() == Some(&b'"') {
        MediaKind::TvSeries
    } else if memmem::find(qualifiers, b"(TV)").is_some() {
        MediaKind::Tv
    } else if memmem::find(qualifiers, b"(VG)").is_some() {
        MediaKind::VideoGame
    } else if memmem::find(qualifiers, b"(V)").is_some() {
        MediaKind::Video
    } else {
        MediaKind::Movie
    };

    TitleParts { partial_len, year, episode, suspended: marker.is_some(), kind }
}

/// An alternate title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlsoKnownAs {
    /// The alternate title.
    pub title: String,
    /// Parenthesised notes after the title, such as the country.
    pub notes: Vec<String>,
}

impl AlsoKnownAs {
    /// Parses a line such as `   (aka Film (1999))\t(France)`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(line);
        let mut parts = text.split('\t').map(str::trim).filter(|p| !p.is_empty());

        let first = parts.next()?;
        let title = match first.strip_prefix("(aka ") {
            Some(inner) => inner.strip_suffix(')').unwrap_or(inner),
            None => first,
        };
        let notes = parts
            .map(|p| p.strip_prefix('(').and_then(|p| p.strip_suffix(')')).unwrap_or(p).to_string())
            .collect();

        Some(Self { title: title.trim().to_string(), notes })
    }
}

/// Vote statistics for a title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rating {
    /// Ten vote-distribution characters, one per score.
    pub distribution: String,
    /// Number of votes.
    pub votes: u64,
    /// Weighted rank.
    pub rank: f64,
}

impl Rating {
    /// Parses the statistics columns of a ratings line.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(data);
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [distribution, votes, rank] = fields.get(fields.len().checked_sub(3)?..)? else {
            return None;
        };
        if distribution.len() != 10 {
            return None;
        }

        Some(Self {
            distribution: distribution.to_string(),
            votes: votes.parse().ok()?,
            rank: rank.parse().ok()?,
        })
    }

    /// Share of votes for `score` (1-10) as a percentage.
    ///
    /// `.` means no votes and `*` means a full bucket; a digit is weighed
    /// against the sum of all buckets.
    pub fn percent(&self, score: usize) -> Option<f64> {
        if !(1..=10).contains(&score) {
            return None;
        }
        let weight = |c: u8| match c {
            b'*' => 1,
            b'.' => 0,
            c if c.is_ascii_digit() => u32::from(c - b'0'),
            _ => 0,
        };

        let bytes = self.distribution.as_bytes();
        match bytes.get(score - 1)? {
            b'.' => Some(0.0),
            b'*' => Some(1.0),
            &c => {
                let sum: u32 = bytes.iter().map(|&b| weight(b)).sum();
                if sum == 0 {
                    return Some(0.0);
                }
                Some(f64::from(weight(c)) / f64::from(sum) * 100.0)
            }
        }
    }
}

/// A plot summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plot {
    /// The summary text, lines joined by spaces.
    pub text: String,
    /// The author, from the `BY:` line.
    pub by: Option<String>,
}

/// Parses `PL:` lines and their `BY:` author lines.
pub fn parse_plots(body: &[u8]) -> Vec<Plot> {
    let text = String::from_utf8_lossy(body);
    let mut plots = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("PL:") {
            lines.push(rest.trim());
        } else if let Some(rest) = line.strip_prefix("BY:") {
            if !lines.is_empty() {
                plots.push(Plot { text: lines.join(" "), by: Some(rest.trim().to_string()) });
                lines.clear();
            }
        }
    }
    if !lines.is_empty() {
        plots.push(Plot { text: lines.join(" "), by: None });
    }
    plots
}

fn lossy<S: Serializer>(bytes: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// A title joined with its genres, alternate titles, rating, plots and
/// global id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleRecord {
    /// Full title key.
    #[serde(serialize_with = "lossy")]
    pub key: Bytes,
    /// Title and year group only.
    #[serde(serialize_with = "lossy")]
    pub partial_key: Bytes,
    /// Production kind.
    pub kind: MediaKind,
    /// Year group text.
    pub year: Option<String>,
    /// Episode qualifier.
    pub episode: Option<String>,
    /// Suspended marker present.
    pub suspended: bool,
    /// Release years from the movies list.
    pub years: Option<String>,
    /// Genres, deduplicated.
    pub genres: BTreeSet<String>,
    /// Alternate titles.
    pub also_known_as: Vec<AlsoKnownAs>,
    /// Alternate titles of the series this part belongs to.
    pub parent_also_known_as: Vec<AlsoKnownAs>,
    /// Vote statistics.
    pub rating: Option<Rating>,
    /// Plot summaries.
    pub plots: Vec<Plot>,
    /// Global id.
    pub media_id: Option<String>,
    /// Global id of the series this part belongs to.
    pub parent_media_id: Option<String>,
    /// `media_id` was allocated during this import.
    pub new_media_id: bool,
}

impl TitleRecord {
    /// Builds the record for a movies line.
    pub fn from_movie(movie: &TabbedRecord) -> Self {
        let parts = analyze(&movie.key);
        let years = (!movie.value.is_empty())
            .then(|| String::from_utf8_lossy(&movie.value).into_owned());

        Self {
            key: movie.key.clone(),
            partial_key: movie.key.slice(..parts.partial_len),
            kind: parts.kind,
            year: parts.year,
            episode: parts.episode,
            suspended: parts.suspended,
            years,
            genres: BTreeSet::new(),
            also_known_as: Vec::new(),
            parent_also_known_as: Vec::new(),
            rating: None,
            plots: Vec::new(),
            media_id: None,
            parent_media_id: None,
            new_media_id: false,
        }
    }

    /// Adds genres from matching genre lines.
    pub fn add_genres(&mut self, genres: Vec<TabbedRecord>) {
        for genre in genres {
            if !genre.value.is_empty() {
                self.genres.insert(String::from_utf8_lossy(&genre.value).into_owned());
            }
        }
    }

    /// Adds alternate titles from matching blocks.
    pub fn add_also_known_as(&mut self, blocks: Vec<AkaRecord>) {
        for block in blocks {
            let akas = block.titles.iter().filter_map(|line| AlsoKnownAs::parse(line));
            self.also_known_as.extend(akas);
        }
    }

    /// Sets the rating from the first parseable ratings line.
    pub fn set_rating(&mut self, ratings: Vec<RatingRecord>) {
        if let Some(rating) = ratings.iter().find_map(|r| Rating::parse(&r.data)) {
            self.rating = Some(rating);
        }
    }

    /// Adds plot summaries from matching blocks.
    pub fn add_plots(&mut self, blocks: Vec<PlotRecord>) {
        for block in blocks {
            self.plots.extend(parse_plots(&block.body));
        }
    }

    /// Uses an existing global id, or `allocate`s a new one.
    pub fn assign_media_id(&mut self, ids: Vec<TabbedRecord>, allocate: impl FnOnce() -> String) {
        match ids.into_iter().find(|id| !id.value.is_empty()) {
            Some(id) => {
                self.media_id = Some(String::from_utf8_lossy(&id.value).into_owned());
                self.new_media_id = false;
            }
            None => {
                self.media_id = Some(allocate());
                self.new_media_id = true;
            }
        }
    }

    /// Full title as text.
    pub fn title(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

impl Keyed for TitleRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Composite for TitleRecord {
    fn lineage(&self) -> Lineage {
        match (self.kind, &self.episode) {
            (MediaKind::TvSeries, None) => Lineage::SeriesRoot,
            (MediaKind::TvSeries, Some(_)) => Lineage::SeriesPart,
            _ => Lineage::Standalone,
        }
    }

    fn partial_key(&self) -> &[u8] {
        &self.partial_key
    }

    fn inherit(&mut self, root: &Self) {
        self.parent_media_id = root.media_id.clone();
        self.parent_also_known_as.extend(root.also_known_as.iter().cloned());
        self.genres.extend(root.genres.iter().cloned());
    }
}
