//! Read-only access to the pool of swipeable profiles.
//!
//! The engine only specifies the filter contract; any backend that can
//! answer [`CandidateStore::find_candidates`] will do.  [`Store`] implements
//! it over the SQLite `profiles` index.

use ember_shared::geo::BoundingBox;
use ember_shared::{AccountStatus, ContentSafetyLevel, Gender, GeoPoint, UserId};
use ember_store::profiles::{self, ProfileQuery};
use ember_store::{CandidateProfile, Store};

use crate::error::Result;

/// Selection criteria for one discovery fetch.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    /// The viewer, excluded from results.
    pub viewer_id: UserId,
    pub min_age: u8,
    pub max_age: u8,
    /// Candidate genders the viewer wants to see.
    pub genders: Vec<Gender>,
    /// Only candidates whose orientation includes this gender.
    pub viewer_gender: Gender,
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Account statuses allowed through.
    pub statuses: Vec<AccountStatus>,
    pub max_content_level: ContentSafetyLevel,
    /// Also return incognito profiles.
    pub include_hidden: bool,
    /// Ask the backend to skip targets the viewer already decided on.  The
    /// queue builder re-checks regardless.
    pub skip_decided: bool,
    /// How many rows to fetch; callers oversample.
    pub limit: u32,
}

pub trait CandidateStore: Send + Sync {
    fn find_candidates(&self, filter: &CandidateFilter) -> Result<Vec<CandidateProfile>>;

    fn profile(&self, user_id: &UserId) -> Result<Option<CandidateProfile>>;
}

impl CandidateStore for Store {
    fn find_candidates(&self, filter: &CandidateFilter) -> Result<Vec<CandidateProfile>> {
        let query = ProfileQuery {
            exclude_user: filter.viewer_id.clone(),
            exclude_decided_by: filter.skip_decided.then(|| filter.viewer_id.clone()),
            min_age: filter.min_age,
            max_age: filter.max_age,
            genders: filter.genders.clone(),
            seeking: Some(filter.viewer_gender),
            bbox: BoundingBox::around(&filter.center, filter.radius_km),
            statuses: filter.statuses.clone(),
            content_levels: filter.max_content_level.at_most(),
            include_hidden: filter.include_hidden,
            limit: filter.limit,
        };
        Ok(self.with_db(|db| profiles::query(db.conn(), &query))?)
    }

    fn profile(&self, user_id: &UserId) -> Result<Option<CandidateProfile>> {
        Ok(self.with_db(|db| profiles::get(db.conn(), user_id))?)
    }
}
