//! # Content Negotiation
//!
//! `Accept` header parsing and quality-weighted selection among the
//! registered media types.
//!
//! Selection rules:
//!
//! - For each available media type, the most specific matching range in
//!   the header (`type/subtype` > `type/*` > `*/*`) decides its quality.
//! - `q=0` refuses a media type, even if a wildcard would accept it.
//! - The highest positive quality wins. Ties go to the range listed first
//!   in the header, then to the media type offered first.

use std::fmt;

/// Qualities are kept in thousandths, the precision HTTP allows.
const MAX_QUALITY: u16 = 1000;

/// One `type/subtype[; q=value]` entry of an `Accept` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    /// Main type, `*` for any
    pub main_type: String,
    /// Subtype, `*` for any
    pub subtype: String,
    /// Quality in thousandths (`0..=1000`)
    pub quality: u16,
}

impl MediaRange {
    /// Parse a single entry; `None` when it is not a media range
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        let (main_type, subtype) = match essence.as_str() {
            "*" => ("*".to_string(), "*".to_string()),
            _ => {
                let (t, s) = essence.split_once('/')?;
                if t.is_empty() || s.is_empty() || (t == "*" && s != "*") {
                    return None;
                }
                (t.to_string(), s.to_string())
            }
        };

        let mut quality = MAX_QUALITY;
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("q") {
                quality = parse_quality(value.trim())?;
            }
        }

        Some(Self {
            main_type,
            subtype,
            quality,
        })
    }

    /// How specific this range is: 2 for exact, 1 for `type/*`, 0 for `*/*`
    #[must_use]
    pub fn specificity(&self) -> u8 {
        match (self.main_type.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    /// Whether this range covers the concrete media type `mediatype`
    #[must_use]
    pub fn matches(&self, mediatype: &str) -> bool {
        let essence = mediatype.split(';').next().unwrap_or_default().trim();
        let Some((main_type, subtype)) = essence.split_once('/') else {
            return false;
        };
        (self.main_type == "*" || self.main_type.eq_ignore_ascii_case(main_type))
            && (self.subtype == "*" || self.subtype.eq_ignore_ascii_case(subtype))
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.subtype)?;
        if self.quality != MAX_QUALITY {
            write!(f, "; q={}", f32::from(self.quality) / 1000.0)?;
        }
        Ok(())
    }
}

/// Parse a qvalue into thousandths; `None` when malformed or out of range
fn parse_quality(value: &str) -> Option<u16> {
    let q: f32 = value.parse().ok()?;
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((q * 1000.0).round() as u16)
}

/// A parsed `Accept` header, in the order the client listed its ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptHeader {
    /// Media ranges in header order; malformed entries are dropped
    pub media_ranges: Vec<MediaRange>,
}

impl AcceptHeader {
    /// Parse an `Accept` header value
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let media_ranges = header
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(MediaRange::parse)
            .collect();
        Self { media_ranges }
    }

    /// Header with no ranges, as for a request without `Accept`
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no usable range was listed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.media_ranges.is_empty()
    }

    /// Quality the client gives `mediatype`, with the header position of
    /// the range that decided it
    #[must_use]
    pub fn quality_of(&self, mediatype: &str) -> Option<(u16, usize)> {
        let mut decided: Option<(u8, u16, usize)> = None;
        for (position, range) in self.media_ranges.iter().enumerate() {
            if !range.matches(mediatype) {
                continue;
            }
            let specificity = range.specificity();
            if decided.map_or(true, |(best, _, _)| specificity > best) {
                decided = Some((specificity, range.quality, position));
            }
        }
        decided.map(|(_, quality, position)| (quality, position))
    }

    /// Pick the best of `available` for this header
    ///
    /// Returns `None` when every candidate is refused or unmatched.
    pub fn best_match<'a, I>(&self, available: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, u16, usize)> = None;
        for mediatype in available {
            let Some((quality, position)) = self.quality_of(mediatype) else {
                continue;
            };
            if quality == 0 {
                continue;
            }
            let better = best.map_or(true, |(_, best_quality, best_position)| {
                quality > best_quality || (quality == best_quality && position < best_position)
            });
            if better {
                best = Some((mediatype, quality, position));
            }
        }
        best.map(|(mediatype, _, _)| mediatype)
    }
}
