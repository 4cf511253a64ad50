use catalog_tonic_core::{
    Error, Result,
    context::CallContext,
    proto::{Filter, Laptop},
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Keyed storage for catalog laptops.
///
/// Values cross the store boundary by clone in both directions: `save` keeps
/// its own copy and `find`/`search` hand out fresh ones.
pub trait LaptopStore: Send + Sync {
    /// Stores a copy of `laptop`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a laptop with the same id is
    /// already stored.
    fn save(&self, laptop: &Laptop) -> Result<()>;

    /// Returns a copy of the laptop with `id`, if any.
    fn find(&self, id: &str) -> Option<Laptop>;

    /// Scans every stored laptop and calls `on_match` with a copy of each one
    /// that satisfies `filter`.
    ///
    /// Iteration order is unspecified. `ctx` is checked before every
    /// candidate. `on_match` may block or write back to the store: it is
    /// never called while the store is locked.
    ///
    /// # Errors
    ///
    /// Returns the context's cancellation or deadline error if it trips
    /// mid-scan, or the first error returned by `on_match`, unchanged.
    fn search(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        on_match: &mut dyn FnMut(Laptop) -> Result<()>,
    ) -> Result<()>;

    /// Number of stored laptops.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLaptopStore {
    data: RwLock<HashMap<String, Laptop>>,
}

impl InMemoryLaptopStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LaptopStore for InMemoryLaptopStore {
    fn save(&self, laptop: &Laptop) -> Result<()> {
        let mut data = self.data.write();
        if data.contains_key(&laptop.id) {
            return Err(Error::AlreadyExists {
                kind: "laptop",
                id: laptop.id.clone(),
            });
        }
        data.insert(laptop.id.clone(), laptop.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Option<Laptop> {
        self.data.read().get(id).cloned()
    }

    fn search(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        on_match: &mut dyn FnMut(Laptop) -> Result<()>,
    ) -> Result<()> {
        let matches = {
            let data = self.data.read();
            let mut matches = Vec::new();
            for laptop in data.values() {
                ctx.check()?;
                if filter.matches(laptop) {
                    matches.push(laptop.clone());
                }
            }
            matches
        };

        for laptop in matches {
            ctx.check()?;
            on_match(laptop)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_tonic_core::proto::{Cpu, Memory, memory::Unit};
    use tokio_util::sync::CancellationToken;

    fn laptop(id: &str, price: f64, ram_gb: u64) -> Laptop {
        Laptop {
            id: id.to_string(),
            brand: "Lenovo".into(),
            name: "ThinkPad".into(),
            cpu: Some(Cpu {
                number_cores: 8,
                min_ghz: 2.5,
                max_ghz: 4.5,
                ..Default::default()
            }),
            ram: Some(Memory::new(ram_gb, Unit::Gigabyte)),
            price_usd: price,
            ..Default::default()
        }
    }

    fn any_filter() -> Filter {
        Filter {
            max_price_usd: f64::MAX,
            ..Default::default()
        }
    }

    #[test]
    fn save_rejects_duplicate_ids() {
        let store = InMemoryLaptopStore::new();
        store.save(&laptop("a", 1000.0, 8)).unwrap();

        let err = store.save(&laptop("a", 2000.0, 16)).unwrap_err();
        assert_eq!(
            err,
            Error::AlreadyExists {
                kind: "laptop",
                id: "a".into()
            }
        );
        assert_eq!(store.find("a").unwrap().price_usd, 1000.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn find_returns_independent_copies() {
        let store = InMemoryLaptopStore::new();
        let mut original = laptop("a", 1000.0, 8);
        store.save(&original).unwrap();

        original.price_usd = 1.0;
        let mut found = store.find("a").unwrap();
        assert_eq!(found.price_usd, 1000.0);

        found.brand = "mutated".into();
        assert_eq!(store.find("a").unwrap().brand, "Lenovo");
        assert!(store.find("missing").is_none());
    }

    #[test]
    fn search_returns_exactly_the_matches() {
        let store = InMemoryLaptopStore::new();
        store.save(&laptop("cheap", 1500.0, 8)).unwrap();
        store.save(&laptop("pricey", 3500.0, 8)).unwrap();
        store.save(&laptop("small", 1500.0, 2)).unwrap();

        let filter = Filter {
            max_price_usd: 3000.0,
            min_cpu_cores: 4,
            min_cpu_ghz: 2.0,
            min_ram: Some(Memory::new(4096, Unit::Megabyte)),
        };

        let mut found = Vec::new();
        store
            .search(&CallContext::default(), &filter, &mut |l| {
                found.push(l.id);
                Ok(())
            })
            .unwrap();
        assert_eq!(found, vec!["cheap".to_string()]);
    }

    #[test]
    fn search_stops_when_cancelled() {
        let store = InMemoryLaptopStore::new();
        for i in 0..5 {
            store.save(&laptop(&format!("l{i}"), 100.0, 8)).unwrap();
        }

        let ctx = CallContext::new(CancellationToken::new());
        let mut seen = 0;
        let err = store
            .search(&ctx, &any_filter(), &mut |_| {
                seen += 1;
                if seen == 2 {
                    ctx.cancel();
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err, Error::RequestCancelled);
        assert_eq!(seen, 2);
    }

    #[test]
    fn search_callback_can_write_to_the_store() {
        let store = InMemoryLaptopStore::new();
        store.save(&laptop("a", 100.0, 8)).unwrap();

        store
            .search(&CallContext::default(), &any_filter(), &mut |l| {
                store.save(&laptop(&format!("{}-copy", l.id), 100.0, 8))
            })
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.find("a-copy").is_some());
    }

    #[test]
    fn search_propagates_callback_errors() {
        let store = InMemoryLaptopStore::new();
        store.save(&laptop("a", 100.0, 8)).unwrap();
        store.save(&laptop("b", 100.0, 8)).unwrap();

        let mut calls = 0;
        let err = store
            .search(&CallContext::default(), &any_filter(), &mut |_| {
                calls += 1;
                Err(Error::ChannelError {
                    context: "receiver dropped".into(),
                })
            })
            .unwrap_err();

        assert!(matches!(err, Error::ChannelError { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn concurrent_saves_of_distinct_ids_all_land() {
        let store = std::sync::Arc::new(InMemoryLaptopStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.save(&laptop(&format!("{t}-{i}"), 100.0, 8)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
