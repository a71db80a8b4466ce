//! Frecency score computation
//!
//! Frecency blends how often and how recently a page was visited. The most
//! recent visits are sampled; each contributes the weight of its age bucket
//! scaled by a bonus for how the page was reached. The sampled average is
//! then scaled back up by the page's total visit count.

use crate::places::VisitTransition;
use crate::utils::MICROS_PER_DAY;

/// Tunables of the frecency formula
#[derive(Debug, Clone, PartialEq)]
pub struct FrecencyParams {
    /// Number of most recent visits sampled per page
    pub sampled_visits: usize,
    /// Upper bounds (inclusive, in days) of the first four age buckets
    pub bucket_cutoffs_days: [i64; 4],
    /// Weights of the first four age buckets
    pub bucket_weights: [i64; 4],
    /// Weight of visits older than the last cutoff
    pub default_bucket_weight: i64,
    pub link_visit_bonus: i64,
    pub typed_visit_bonus: i64,
    pub bookmark_visit_bonus: i64,
    pub embed_visit_bonus: i64,
    pub perm_redirect_visit_bonus: i64,
    pub temp_redirect_visit_bonus: i64,
    pub download_visit_bonus: i64,
    pub framed_link_visit_bonus: i64,
    pub reload_visit_bonus: i64,
    /// Bonus for a bookmarked page that was never visited
    pub unvisited_bookmark_bonus: i64,
    /// Bonus for a typed page that was never visited
    pub unvisited_typed_bonus: i64,
}

impl Default for FrecencyParams {
    fn default() -> Self {
        Self {
            sampled_visits: 10,
            bucket_cutoffs_days: [4, 14, 31, 90],
            bucket_weights: [100, 70, 50, 30],
            default_bucket_weight: 10,
            link_visit_bonus: 100,
            typed_visit_bonus: 2000,
            bookmark_visit_bonus: 75,
            embed_visit_bonus: 0,
            perm_redirect_visit_bonus: 50,
            temp_redirect_visit_bonus: 0,
            download_visit_bonus: 0,
            framed_link_visit_bonus: 0,
            reload_visit_bonus: 0,
            unvisited_bookmark_bonus: 140,
            unvisited_typed_bonus: 200,
        }
    }
}

impl FrecencyParams {
    /// Bonus (in percent) for a visit of the given transition
    pub fn transition_bonus(&self, transition: VisitTransition) -> i64 {
        match transition {
            VisitTransition::Link => self.link_visit_bonus,
            VisitTransition::Typed => self.typed_visit_bonus,
            VisitTransition::Bookmark => self.bookmark_visit_bonus,
            VisitTransition::Embed => self.embed_visit_bonus,
            VisitTransition::RedirectPermanent => self.perm_redirect_visit_bonus,
            VisitTransition::RedirectTemporary => self.temp_redirect_visit_bonus,
            VisitTransition::Download => self.download_visit_bonus,
            VisitTransition::FramedLink => self.framed_link_visit_bonus,
            VisitTransition::Reload => self.reload_visit_bonus,
        }
    }

    /// Weight of a visit that happened `age_days` ago
    pub fn bucket_weight(&self, age_days: i64) -> i64 {
        self.bucket_cutoffs_days
            .iter()
            .zip(self.bucket_weights.iter())
            .find(|(cutoff, _)| age_days <= **cutoff)
            .map(|(_, weight)| *weight)
            .unwrap_or(self.default_bucket_weight)
    }
}

/// A sampled visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitSample {
    /// Visit time in microseconds since the Unix epoch
    pub visit_date: i64,
    /// `None` for visit types this build does not know
    pub transition: Option<VisitTransition>,
}

/// Everything the formula needs to know about one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrecencyInputs {
    pub visit_count: i64,
    pub typed: bool,
    pub bookmarked: bool,
    /// Most recent visits first
    pub visits: Vec<VisitSample>,
}

/// Compute the frecency of a page. Never negative.
pub fn calculate_frecency(inputs: &FrecencyInputs, params: &FrecencyParams, now: i64) -> i64 {
    let samples: Vec<&VisitSample> = inputs.visits.iter().take(params.sampled_visits).collect();

    if inputs.visit_count > 0 && !samples.is_empty() {
        let mut points = 0.0_f64;
        for visit in &samples {
            let mut bonus = match visit.transition {
                Some(transition) => params.transition_bonus(transition),
                None => {
                    log::debug!("Ignoring visit with unknown transition");
                    0
                }
            };
            if inputs.bookmarked {
                bonus += params.bookmark_visit_bonus;
            }
            if bonus > 0 {
                let weight = params.bucket_weight(age_in_days(visit.visit_date, now));
                points += weight as f64 * (bonus as f64 / 100.0);
            }
        }

        let frecency = (inputs.visit_count as f64 * points.ceil() / samples.len() as f64).ceil();
        return (frecency as i64).max(0);
    }

    if inputs.bookmarked || inputs.typed {
        let mut bonus = 0;
        if inputs.bookmarked {
            bonus += params.unvisited_bookmark_bonus;
        }
        if inputs.typed {
            bonus += params.unvisited_typed_bonus;
        }
        let first_weight = params.bucket_weights[0];
        let frecency = (first_weight as f64 * (bonus as f64 / 100.0)).ceil();
        return (frecency as i64).max(0);
    }

    0
}

/// Whole days between a visit and `now`, rounded; future visits count as today
fn age_in_days(visit_date: i64, now: i64) -> i64 {
    let age = (now - visit_date).max(0) as f64 / MICROS_PER_DAY as f64;
    age.round() as i64
}
