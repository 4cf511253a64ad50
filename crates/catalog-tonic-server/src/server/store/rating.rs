use parking_lot::RwLock;
use std::collections::HashMap;

/// Running score aggregate for one laptop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rating {
    pub count: u32,
    pub sum: f64,
}

impl Rating {
    /// Mean of every submitted score. Zero before the first rating.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

/// Aggregates laptop ratings.
pub trait RatingStore: Send + Sync {
    /// Adds `score` to the aggregate for `laptop_id`, creating it on first
    /// use, and returns the updated aggregate.
    ///
    /// Scores are not range checked.
    fn add(&self, laptop_id: &str, score: f64) -> Rating;

    fn get(&self, laptop_id: &str) -> Option<Rating>;
}

#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    ratings: RwLock<HashMap<String, Rating>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RatingStore for InMemoryRatingStore {
    fn add(&self, laptop_id: &str, score: f64) -> Rating {
        let mut ratings = self.ratings.write();
        let rating = ratings.entry(laptop_id.to_string()).or_default();
        rating.count += 1;
        rating.sum += score;
        *rating
    }

    fn get(&self, laptop_id: &str) -> Option<Rating> {
        self.ratings.read().get(laptop_id).copied()
    }
}
