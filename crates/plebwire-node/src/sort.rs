//! Deterministic listing orders over page entries.
//!
//! Every order is total: after the primary key, ties fall back to the
//! comment cid, so equal inputs always produce byte-identical pages.

use std::cmp::Ordering;

use plebwire_protocol::record::PageEntry;

/// Divisor turning a timestamp into the recency term of `hot`.
const HOT_TIME_DIVISOR: f64 = 45_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortType {
    Hot,
    New,
    Old,
    TopAll,
    ControversialAll,
}

/// Listings published for posts, default (inlined) first.
pub const POST_SORTS: &[SortType] = &[SortType::Hot, SortType::New, SortType::TopAll, SortType::ControversialAll];

/// Listings published for the replies of a comment, default first.
pub const REPLY_SORTS: &[SortType] = &[SortType::TopAll, SortType::New, SortType::Old];

impl SortType {
    /// Key under which the listing appears in `pages` / `pageCids`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Old => "old",
            Self::TopAll => "topAll",
            Self::ControversialAll => "controversialAll",
        }
    }

    /// Sorts `entries` in place.
    pub fn sort(self, entries: &mut [PageEntry]) {
        entries.sort_by(|a, b| self.compare(a, b).then_with(|| a.comment_update.cid.cmp(&b.comment_update.cid)));
    }

    fn compare(self, a: &PageEntry, b: &PageEntry) -> Ordering {
        match self {
            Self::New => timestamp(b).cmp(&timestamp(a)),
            Self::Old => timestamp(a).cmp(&timestamp(b)),
            Self::TopAll => score(b)
                .cmp(&score(a))
                .then_with(|| timestamp(b).cmp(&timestamp(a))),
            Self::Hot => hot(b).total_cmp(&hot(a)),
            Self::ControversialAll => controversial(b).total_cmp(&controversial(a)),
        }
    }
}

impl std::fmt::Display for SortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn timestamp(entry: &PageEntry) -> u64 {
    entry.comment.comment().timestamp.as_secs()
}

fn score(entry: &PageEntry) -> i64 {
    entry.comment_update.score()
}

/// Logarithmic score plus a linear recency bonus.
fn hot(entry: &PageEntry) -> f64 {
    let s = score(entry);
    let order = (s.unsigned_abs().max(1) as f64).log10();
    let sign = s.signum() as f64;
    sign * order + timestamp(entry) as f64 / HOT_TIME_DIVISOR
}

/// Total votes raised to the up/down balance; zero when one side is empty.
fn controversial(entry: &PageEntry) -> f64 {
    let up = entry.comment_update.upvote_count;
    let down = entry.comment_update.downvote_count;
    if up == 0 || down == 0 {
        return 0.0;
    }
    let magnitude = (up + down) as f64;
    let balance = up.min(down) as f64 / up.max(down) as f64;
    magnitude.powf(balance)
}
