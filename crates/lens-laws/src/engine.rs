//! Law evaluation engine.
//!
//! Holds the catalog keyed by law ID, resolves selections, runs laws in ID
//! order, and caches results. Evaluation takes only a read lock on the
//! catalog and never mutates the value it is given.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lens_settings::LawSettings;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheKey, EvaluationCache};
use crate::catalog::laws_from_settings;
use crate::errors::{LawError, Result};
use crate::laws::Law;
use crate::types::{Evaluation, LawInfo, LawSelection, Violation, score};

/// Message attached to a violation produced by a failing law.
const FAULT_MESSAGE: &str = "law could not be evaluated";

/// Default cache capacity for [`LawEngine::default`].
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Evaluates store values against an open catalog of laws.
pub struct LawEngine {
    laws: RwLock<BTreeMap<String, Arc<dyn Law>>>,
    cache: Mutex<EvaluationCache>,
}

impl LawEngine {
    /// Create an engine with an empty catalog.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            laws: RwLock::new(BTreeMap::new()),
            cache: Mutex::new(EvaluationCache::new(cache_capacity)),
        }
    }

    /// Create an engine with the default catalog and the custom laws
    /// configured in `settings`.
    pub fn from_settings(settings: &LawSettings) -> Result<Self> {
        let engine = Self::new(settings.cache_capacity);
        for law in laws_from_settings(settings)? {
            engine.register(law)?;
        }
        debug!(law_count = engine.laws.read().len(), "law engine initialized");
        Ok(engine)
    }

    /// Add a law. Fails if the ID is taken.
    pub fn register(&self, law: Arc<dyn Law>) -> Result<()> {
        let id = law.id().to_string();
        {
            let mut laws = self.laws.write();
            if laws.contains_key(&id) {
                return Err(LawError::DuplicateLaw { law_id: id });
            }
            let _ = laws.insert(id.clone(), law);
            self.cache.lock().invalidate();
        }
        debug!(law_id = %id, "law registered");
        Ok(())
    }

    /// Remove a law. Returns `false` if it was not registered.
    pub fn unregister(&self, law_id: &str) -> bool {
        let mut laws = self.laws.write();
        let removed = laws.remove(law_id).is_some();
        if removed {
            self.cache.lock().invalidate();
            debug!(law_id, "law unregistered");
        }
        removed
    }

    /// Catalog listing in ID order.
    pub fn catalog(&self) -> Vec<LawInfo> {
        self.laws.read().values().map(|law| law.info()).collect()
    }

    /// Whether a law with this ID is registered.
    pub fn contains(&self, law_id: &str) -> bool {
        self.laws.read().contains_key(law_id)
    }

    /// Resolve a selection to sorted, de-duplicated law IDs.
    pub fn resolve(&self, selection: &LawSelection) -> Result<Vec<String>> {
        let laws = self.laws.read();
        Ok(resolve_in(&laws, selection)?
            .into_iter()
            .map(|law| law.id().to_string())
            .collect())
    }

    /// Evaluate `value` against the selected laws.
    ///
    /// Only an unknown law ID fails the call. A law that errors or panics is
    /// reported as an `error` violation and the rest still run.
    pub fn evaluate(&self, value: &Value, selection: &LawSelection) -> Result<Evaluation> {
        let (laws, generation) = {
            let catalog = self.laws.read();
            let laws = resolve_in(&catalog, selection)?;
            // Read under the catalog lock so a concurrent register is either
            // fully visible or bumps the generation after this point.
            (laws, self.cache.lock().generation())
        };
        let law_ids: Vec<String> = laws.iter().map(|l| l.id().to_string()).collect();

        let key = CacheKey::new(value, law_ids.clone());
        if let Some(hit) = key.as_ref().and_then(|k| self.cache.lock().get(k)) {
            return Ok(hit);
        }

        let violations: Vec<Violation> = laws.iter().filter_map(|law| run_law(law.as_ref(), value)).collect();
        let evaluation = Evaluation {
            score: score(&violations),
            violations,
            evaluated_laws: law_ids,
        };

        if let Some(key) = key {
            self.cache.lock().insert(generation, key, evaluation.clone());
        }
        Ok(evaluation)
    }

    /// A remediation hint for `violation`: its own suggestion, else the law's
    /// generic remediation. Never changes anything.
    pub fn suggest_auto_fix(&self, violation: &Violation) -> Option<String> {
        violation.suggestion.clone().or_else(|| {
            self.laws
                .read()
                .get(&violation.rule_id)
                .and_then(|law| law.remediation().map(str::to_string))
        })
    }
}

impl Default for LawEngine {
    fn default() -> Self {
        let engine = Self::new(DEFAULT_CACHE_CAPACITY);
        for law in crate::catalog::default_laws(crate::catalog::CatalogLimits::default()) {
            // Default IDs are distinct.
            let _ = engine.register(law);
        }
        engine
    }
}

impl std::fmt::Debug for LawEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LawEngine")
            .field("law_count", &self.laws.read().len())
            .finish_non_exhaustive()
    }
}

fn resolve_in(
    catalog: &BTreeMap<String, Arc<dyn Law>>,
    selection: &LawSelection,
) -> Result<Vec<Arc<dyn Law>>> {
    match selection {
        LawSelection::All => Ok(catalog.values().cloned().collect()),
        LawSelection::Ids(ids) => {
            let mut picked: BTreeMap<&str, Arc<dyn Law>> = BTreeMap::new();
            for id in ids {
                let law = catalog.get(id).ok_or_else(|| LawError::UnknownLaw {
                    law_id: id.clone(),
                })?;
                let _ = picked.insert(id.as_str(), Arc::clone(law));
            }
            Ok(picked.into_values().collect())
        }
    }
}

fn run_law(law: &dyn Law, value: &Value) -> Option<Violation> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| law.check(value)));
    match outcome {
        Ok(Ok(outcome)) if outcome.valid => None,
        Ok(Ok(outcome)) => Some(Violation {
            rule_id: law.id().to_string(),
            category: law.category(),
            severity: law.severity(),
            message: outcome.message,
            suggestion: outcome.suggestion,
        }),
        Ok(Err(error)) => {
            warn!(law_id = law.id(), %error, "law check failed");
            Some(fault(law))
        }
        Err(_) => {
            warn!(law_id = law.id(), "law check panicked");
            Some(fault(law))
        }
    }
}

fn fault(law: &dyn Law) -> Violation {
    Violation {
        rule_id: law.id().to_string(),
        category: law.category(),
        severity: crate::types::Severity::Error,
        message: FAULT_MESSAGE.to_string(),
        suggestion: None,
    }
}
