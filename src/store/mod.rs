use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::route::{Route, RouteKey, RouteStatus, Shift};
use crate::models::stop::CandidateStop;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteFilter {
    pub date: Option<NaiveDate>,
    pub shift: Option<Shift>,
    pub status: Option<RouteStatus>,
    pub driver_id: Option<String>,
}

impl RouteFilter {
    pub fn matches(&self, route: &Route) -> bool {
        self.date.is_none_or(|date| route.date == date)
            && self.shift.is_none_or(|shift| route.shift == shift)
            && self.status.is_none_or(|status| route.status == status)
            && self
                .driver_id
                .as_deref()
                .is_none_or(|driver| route.driver_id.as_deref() == Some(driver))
    }
}

/// Persistence boundary for route aggregates and the candidate pool.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn insert(&self, route: Route) -> Result<Route, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Route>, AppError>;

    async fn find_by_key(&self, key: &RouteKey) -> Result<Option<Route>, AppError>;

    async fn list(&self, filter: &RouteFilter) -> Result<Vec<Route>, AppError>;

    /// Conditional write: succeeds only while the stored version equals
    /// `expected_version`, and stores the route at `expected_version + 1`.
    async fn update(&self, route: Route, expected_version: u64) -> Result<Route, AppError>;

    /// Adds candidates to the pool. A subscription already pooled for the
    /// date and shift is not added again; the first posting wins.
    async fn add_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
        candidates: Vec<CandidateStop>,
    ) -> Result<usize, AppError>;

    /// Drops candidates that were consumed by a build. Candidates posted
    /// after the build loaded the pool stay in it.
    async fn remove_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
        consumed: &[CandidateStop],
    ) -> Result<usize, AppError>;

    async fn load_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
    ) -> Result<Vec<CandidateStop>, AppError>;
}

#[derive(Default)]
pub struct InMemoryRouteStore {
    routes: DashMap<Uuid, Route>,
    keys: DashMap<RouteKey, Uuid>,
    candidates: DashMap<(NaiveDate, Shift), Vec<CandidateStop>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_key(&self, key: &RouteKey, route_id: Uuid) -> Result<bool, AppError> {
        match self.keys.entry(key.clone()) {
            Entry::Occupied(entry) if *entry.get() == route_id => Ok(false),
            Entry::Occupied(entry) => Err(AppError::Conflict(format!(
                "route {} already covers {key}",
                entry.get()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(route_id);
                Ok(true)
            }
        }
    }

    fn release_key(&self, key: &RouteKey, route_id: Uuid) {
        self.keys.remove_if(key, |_, owner| *owner == route_id);
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn insert(&self, route: Route) -> Result<Route, AppError> {
        let claimed = match route.key() {
            Some(key) => self.claim_key(&key, route.id)?,
            None => false,
        };

        match self.routes.entry(route.id) {
            Entry::Occupied(_) => {
                if claimed {
                    if let Some(key) = route.key() {
                        self.release_key(&key, route.id);
                    }
                }
                Err(AppError::Conflict(format!("route {} already exists", route.id)))
            }
            Entry::Vacant(entry) => {
                entry.insert(route.clone());
                Ok(route)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Route>, AppError> {
        Ok(self.routes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_key(&self, key: &RouteKey) -> Result<Option<Route>, AppError> {
        let Some(id) = self.keys.get(key).map(|entry| *entry.value()) else {
            return Ok(None);
        };

        Ok(self.routes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, filter: &RouteFilter) -> Result<Vec<Route>, AppError> {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        routes.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(routes)
    }

    async fn update(&self, mut route: Route, expected_version: u64) -> Result<Route, AppError> {
        let mut slot = self
            .routes
            .get_mut(&route.id)
            .ok_or_else(|| AppError::NotFound(format!("route {} not found", route.id)))?;

        if slot.version != expected_version {
            return Err(AppError::ConcurrentModification {
                expected: expected_version,
                actual: slot.version,
            });
        }

        let old_key = slot.value().key();
        let new_key = route.key();
        if new_key != old_key {
            if let Some(key) = &new_key {
                self.claim_key(key, route.id)?;
            }
            if let Some(key) = &old_key {
                self.release_key(key, route.id);
            }
        }

        route.version = expected_version + 1;
        *slot = route.clone();
        Ok(route)
    }

    async fn add_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
        candidates: Vec<CandidateStop>,
    ) -> Result<usize, AppError> {
        let mut pool = self.candidates.entry((date, shift)).or_default();
        for candidate in candidates {
            let already_pooled = candidate.subscription_id.as_deref().is_some_and(|id| {
                pool.iter()
                    .any(|pooled| pooled.subscription_id.as_deref() == Some(id))
            });
            if !already_pooled {
                pool.push(candidate);
            }
        }
        Ok(pool.len())
    }

    async fn remove_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
        consumed: &[CandidateStop],
    ) -> Result<usize, AppError> {
        let Some(mut pool) = self.candidates.get_mut(&(date, shift)) else {
            return Ok(0);
        };

        pool.retain(|candidate| !consumed.contains(candidate));
        let remaining = pool.len();
        if remaining == 0 {
            drop(pool);
            self.candidates.remove_if(&(date, shift), |_, pool| pool.is_empty());
        }
        Ok(remaining)
    }

    async fn load_candidates(
        &self,
        date: NaiveDate,
        shift: Shift,
    ) -> Result<Vec<CandidateStop>, AppError> {
        Ok(self
            .candidates
            .get(&(date, shift))
            .map(|pool| pool.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn draft() -> Route {
        Route::new(date(), Shift::Morning, 5, None, Utc::now())
    }

    fn bound(mut route: Route, driver: &str) -> Route {
        route.driver_id = Some(driver.to_string());
        route.status = RouteStatus::Assigned;
        route
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryRouteStore::new();
        let route = store.insert(draft()).await.unwrap();
        assert_eq!(route.version, 0);

        let saved = store.update(route.clone(), 0).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(store.get(route.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_concurrent_modification() {
        let store = InMemoryRouteStore::new();
        let route = store.insert(draft()).await.unwrap();

        store.update(route.clone(), 0).await.unwrap();
        let result = store.update(route.clone(), 0).await;

        assert!(matches!(
            result,
            Err(AppError::ConcurrentModification {
                expected: 0,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn driver_date_shift_is_unique() {
        let store = InMemoryRouteStore::new();
        let first = store.insert(draft()).await.unwrap();
        let second = store.insert(draft()).await.unwrap();

        store.update(bound(first.clone(), "d1"), 0).await.unwrap();
        let result = store.update(bound(second.clone(), "d1"), 0).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let key = RouteKey {
            driver_id: "d1".to_string(),
            date: date(),
            shift: Shift::Morning,
        };
        assert_eq!(store.find_by_key(&key).await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn cancelling_releases_the_key() {
        let store = InMemoryRouteStore::new();
        let first = store.insert(draft()).await.unwrap();
        let second = store.insert(draft()).await.unwrap();

        let assigned = store.update(bound(first, "d1"), 0).await.unwrap();
        let mut cancelled = assigned.clone();
        cancelled.status = RouteStatus::Cancelled;
        store.update(cancelled, assigned.version).await.unwrap();

        assert!(store.update(bound(second, "d1"), 0).await.is_ok());
    }

    #[tokio::test]
    async fn candidate_pool_skips_reposted_subscriptions() {
        let store = InMemoryRouteStore::new();
        let candidate = CandidateStop {
            subscription_id: Some("s".to_string()),
            order_id: None,
            customer_id: None,
            customer_name: "C".to_string(),
            address: "A".to_string(),
            location: None,
            phone: None,
            meal_type: None,
            time_slot: None,
            notes: None,
        };

        let mut other = candidate.clone();
        other.subscription_id = Some("t".to_string());

        store
            .add_candidates(date(), Shift::Morning, vec![candidate.clone()])
            .await
            .unwrap();
        let total = store
            .add_candidates(date(), Shift::Morning, vec![candidate.clone(), other])
            .await
            .unwrap();

        assert_eq!(total, 2);
        let pooled = store.load_candidates(date(), Shift::Morning).await.unwrap();
        assert_eq!(pooled[0].subscription_id.as_deref(), Some("s"));

        let remaining = store
            .remove_candidates(date(), Shift::Morning, &[candidate])
            .await
            .unwrap();
        assert_eq!(remaining, 1);
        assert!(store
            .load_candidates(date(), Shift::Evening)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_applies_filter() {
        let store = InMemoryRouteStore::new();
        let route = store.insert(draft()).await.unwrap();
        store.update(bound(route, "d9"), 0).await.unwrap();
        store.insert(draft()).await.unwrap();

        let filter = RouteFilter {
            driver_id: Some("d9".to_string()),
            ..RouteFilter::default()
        };
        assert_eq!(store.list(&filter).await.unwrap().len(), 1);
        assert_eq!(store.list(&RouteFilter::default()).await.unwrap().len(), 2);
    }
}
