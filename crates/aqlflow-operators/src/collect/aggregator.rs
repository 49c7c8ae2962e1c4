//! Named aggregate functions.
//!
//! Aggregates are looked up by name in an [`AggregatorRegistry`]. The default
//! registry holds the built-in functions; callers can build their own registry
//! and register additional functions.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use aqlflow_core::value::{self, AqlValue, OrderedValue};
use aqlflow_core::{Error, Result};

/// Accumulator for one aggregate of one group.
pub trait Aggregator: Send {
    /// Fold one value into the accumulator.
    fn reduce(&mut self, value: &AqlValue);

    /// Current result. Does not consume the state.
    fn finish(&self) -> AqlValue;

    /// Back to the initial state for the next group.
    fn reset(&mut self);
}

pub type AggregatorFactory = Arc<dyn Fn() -> Box<dyn Aggregator> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    factories: HashMap<String, AggregatorFactory>,
}

impl AggregatorRegistry {
    /// A registry without any functions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in functions.
    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        r.register_fn(&["LENGTH", "COUNT"], || Box::new(Length::default()));
        r.register_fn(&["MIN"], || Box::new(Min::default()));
        r.register_fn(&["MAX"], || Box::new(Max::default()));
        r.register_fn(&["SUM"], || Box::new(Sum::default()));
        r.register_fn(&["AVERAGE", "AVG"], || Box::new(Average::default()));
        r.register_fn(&["VARIANCE_POPULATION", "VARIANCE"], || {
            Box::new(Variance::new(false, false))
        });
        r.register_fn(&["VARIANCE_SAMPLE"], || Box::new(Variance::new(true, false)));
        r.register_fn(&["STDDEV_POPULATION", "STDDEV"], || {
            Box::new(Variance::new(false, true))
        });
        r.register_fn(&["STDDEV_SAMPLE"], || Box::new(Variance::new(true, true)));
        r.register_fn(&["UNIQUE"], || Box::new(Unique::default()));
        r.register_fn(&["SORTED_UNIQUE"], || Box::new(SortedUnique::default()));
        r.register_fn(&["COUNT_DISTINCT", "COUNT_UNIQUE"], || {
            Box::new(CountDistinct::default())
        });
        r.register_fn(&["PUSH"], || Box::new(Push::default()));
        r.register_fn(&["BIT_AND"], || Box::new(Bitwise::new(BitOp::And)));
        r.register_fn(&["BIT_OR"], || Box::new(Bitwise::new(BitOp::Or)));
        r.register_fn(&["BIT_XOR"], || Box::new(Bitwise::new(BitOp::Xor)));
        r
    }

    fn register_fn(&mut self, names: &[&str], f: fn() -> Box<dyn Aggregator>) {
        let factory: AggregatorFactory = Arc::new(f);
        for name in names {
            self.factories.insert((*name).to_string(), Arc::clone(&factory));
        }
    }

    /// Register (or replace) a function. Names are case-insensitive.
    pub fn register(&mut self, name: &str, factory: AggregatorFactory) {
        self.factories.insert(name.to_ascii_uppercase(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_uppercase())
    }

    /// Create a fresh accumulator for `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Aggregator>> {
        self.factories
            .get(&name.to_ascii_uppercase())
            .map(|f| f())
            .ok_or_else(|| Error::BadParameter(format!("unknown aggregate function '{name}'")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<AggregatorRegistry>> =
    Lazy::new(|| Arc::new(AggregatorRegistry::with_defaults()));

/// Shared registry of the built-in functions.
pub fn default_registry() -> Arc<AggregatorRegistry> {
    Arc::clone(&DEFAULT_REGISTRY)
}

#[derive(Default)]
struct Length {
    count: u64,
}

impl Aggregator for Length {
    fn reduce(&mut self, _value: &AqlValue) {
        self.count += 1;
    }
    fn finish(&self) -> AqlValue {
        AqlValue::from(self.count)
    }
    fn reset(&mut self) {
        self.count = 0;
    }
}

#[derive(Default)]
struct Min {
    value: Option<AqlValue>,
}

impl Aggregator for Min {
    fn reduce(&mut self, value: &AqlValue) {
        if value.is_null() {
            return;
        }
        let smaller = match &self.value {
            Some(cur) => value::compare(value, cur).is_lt(),
            None => true,
        };
        if smaller {
            self.value = Some(value.clone());
        }
    }
    fn finish(&self) -> AqlValue {
        self.value.clone().unwrap_or(AqlValue::Null)
    }
    fn reset(&mut self) {
        self.value = None;
    }
}

#[derive(Default)]
struct Max {
    value: Option<AqlValue>,
}

impl Aggregator for Max {
    fn reduce(&mut self, value: &AqlValue) {
        if value.is_null() {
            return;
        }
        let larger = match &self.value {
            Some(cur) => value::compare(value, cur).is_gt(),
            None => true,
        };
        if larger {
            self.value = Some(value.clone());
        }
    }
    fn finish(&self) -> AqlValue {
        self.value.clone().unwrap_or(AqlValue::Null)
    }
    fn reset(&mut self) {
        self.value = None;
    }
}

/// Numeric fold state: nulls are skipped, any other non-number poisons the result.
#[derive(Default)]
struct Numeric {
    sum: f64,
    count: u64,
    invalid: bool,
}

impl Numeric {
    fn accept(&mut self, value: &AqlValue) -> Option<f64> {
        if self.invalid || value.is_null() {
            return None;
        }
        match value::as_number(value) {
            Some(n) => {
                self.count += 1;
                Some(n)
            }
            None => {
                self.invalid = true;
                None
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Default)]
struct Sum {
    state: Numeric,
}

impl Aggregator for Sum {
    fn reduce(&mut self, value: &AqlValue) {
        if let Some(n) = self.state.accept(value) {
            self.state.sum += n;
        }
    }
    fn finish(&self) -> AqlValue {
        if self.state.invalid {
            return AqlValue::Null;
        }
        value::number(self.state.sum)
    }
    fn reset(&mut self) {
        self.state.reset();
    }
}

#[derive(Default)]
struct Average {
    state: Numeric,
}

impl Aggregator for Average {
    fn reduce(&mut self, value: &AqlValue) {
        if let Some(n) = self.state.accept(value) {
            self.state.sum += n;
        }
    }
    fn finish(&self) -> AqlValue {
        if self.state.invalid || self.state.count == 0 {
            return AqlValue::Null;
        }
        value::number(self.state.sum / self.state.count as f64)
    }
    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Welford's online variance.
struct Variance {
    sample: bool,
    stddev: bool,
    state: Numeric,
    mean: f64,
    m2: f64,
}

impl Variance {
    fn new(sample: bool, stddev: bool) -> Self {
        Self {
            sample,
            stddev,
            state: Numeric::default(),
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl Aggregator for Variance {
    fn reduce(&mut self, value: &AqlValue) {
        if let Some(n) = self.state.accept(value) {
            let delta = n - self.mean;
            self.mean += delta / self.state.count as f64;
            self.m2 += delta * (n - self.mean);
        }
    }
    fn finish(&self) -> AqlValue {
        let count = self.state.count;
        if self.state.invalid || count == 0 || (self.sample && count < 2) {
            return AqlValue::Null;
        }
        let divisor = if self.sample { count - 1 } else { count };
        let variance = self.m2 / divisor as f64;
        if self.stddev {
            value::number(variance.sqrt())
        } else {
            value::number(variance)
        }
    }
    fn reset(&mut self) {
        self.state.reset();
        self.mean = 0.0;
        self.m2 = 0.0;
    }
}

/// Distinct non-null values in order of first appearance.
#[derive(Default)]
struct Unique {
    seen: BTreeSet<OrderedValue>,
    values: Vec<AqlValue>,
}

impl Aggregator for Unique {
    fn reduce(&mut self, value: &AqlValue) {
        if value.is_null() {
            return;
        }
        if self.seen.insert(OrderedValue(value.clone())) {
            self.values.push(value.clone());
        }
    }
    fn finish(&self) -> AqlValue {
        AqlValue::Array(self.values.clone())
    }
    fn reset(&mut self) {
        self.seen.clear();
        self.values.clear();
    }
}

#[derive(Default)]
struct SortedUnique {
    seen: BTreeSet<OrderedValue>,
}

impl Aggregator for SortedUnique {
    fn reduce(&mut self, value: &AqlValue) {
        if !value.is_null() {
            self.seen.insert(OrderedValue(value.clone()));
        }
    }
    fn finish(&self) -> AqlValue {
        AqlValue::Array(self.seen.iter().map(|v| v.0.clone()).collect())
    }
    fn reset(&mut self) {
        self.seen.clear();
    }
}

#[derive(Default)]
struct CountDistinct {
    seen: BTreeSet<OrderedValue>,
}

impl Aggregator for CountDistinct {
    fn reduce(&mut self, value: &AqlValue) {
        if !value.is_null() {
            self.seen.insert(OrderedValue(value.clone()));
        }
    }
    fn finish(&self) -> AqlValue {
        AqlValue::from(self.seen.len())
    }
    fn reset(&mut self) {
        self.seen.clear();
    }
}

/// Every value, nulls included, in arrival order.
#[derive(Default)]
struct Push {
    values: Vec<AqlValue>,
}

impl Aggregator for Push {
    fn reduce(&mut self, value: &AqlValue) {
        self.values.push(value.clone());
    }
    fn finish(&self) -> AqlValue {
        AqlValue::Array(self.values.clone())
    }
    fn reset(&mut self) {
        self.values.clear();
    }
}

#[derive(Clone, Copy)]
enum BitOp {
    And,
    Or,
    Xor,
}

/// Bitwise folds over unsigned 32-bit integers.
struct Bitwise {
    op: BitOp,
    acc: Option<u64>,
    invalid: bool,
}

impl Bitwise {
    fn new(op: BitOp) -> Self {
        Self {
            op,
            acc: None,
            invalid: false,
        }
    }
}

impl Aggregator for Bitwise {
    fn reduce(&mut self, value: &AqlValue) {
        if self.invalid || value.is_null() {
            return;
        }
        let Some(n) = value.as_u64().filter(|n| *n <= u64::from(u32::MAX)) else {
            self.invalid = true;
            return;
        };
        self.acc = Some(match (self.acc, self.op) {
            (None, _) => n,
            (Some(a), BitOp::And) => a & n,
            (Some(a), BitOp::Or) => a | n,
            (Some(a), BitOp::Xor) => a ^ n,
        });
    }
    fn finish(&self) -> AqlValue {
        match (self.invalid, self.acc) {
            (false, Some(a)) => AqlValue::from(a),
            _ => AqlValue::Null,
        }
    }
    fn reset(&mut self) {
        self.acc = None;
        self.invalid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fold(name: &str, values: &[AqlValue]) -> AqlValue {
        let mut agg = default_registry().create(name).unwrap();
        for v in values {
            agg.reduce(v);
        }
        agg.finish()
    }

    #[test]
    fn initial_values() {
        assert_eq!(fold("SUM", &[]), json!(0));
        assert_eq!(fold("LENGTH", &[]), json!(0));
        assert_eq!(fold("MIN", &[]), json!(null));
        assert_eq!(fold("AVERAGE", &[]), json!(null));
        assert_eq!(fold("PUSH", &[]), json!([]));
    }

    #[test]
    fn numeric_aggregates_skip_nulls_and_reject_other_types() {
        assert_eq!(fold("SUM", &[json!(1), json!(null), json!(2.5)]), json!(3.5));
        assert_eq!(fold("SUM", &[json!(1), json!("2")]), json!(null));
        assert_eq!(fold("AVG", &[json!(1), json!(null), json!(3)]), json!(2));
    }

    #[test]
    fn length_counts_every_row() {
        assert_eq!(fold("count", &[json!(null), json!("a"), json!(1)]), json!(3));
    }

    #[test]
    fn min_max_use_value_ordering() {
        let values = [json!("b"), json!(null), json!(3), json!([1])];
        assert_eq!(fold("MIN", &values), json!(3));
        assert_eq!(fold("MAX", &values), json!([1]));
    }

    #[test]
    fn variance_family() {
        assert_eq!(fold("VARIANCE_POPULATION", &[json!(1), json!(3)]), json!(1));
        assert_eq!(fold("STDDEV", &[json!(1), json!(3)]), json!(1));
        assert_eq!(fold("VARIANCE_SAMPLE", &[json!(2), json!(4), json!(6)]), json!(4));
        assert_eq!(fold("STDDEV_SAMPLE", &[json!(2), json!(4), json!(6)]), json!(2));
        assert_eq!(fold("VARIANCE_SAMPLE", &[json!(1)]), json!(null));
    }

    #[test]
    fn unique_variants() {
        let values = [json!(3), json!(1), json!(3), json!(null), json!(1.0)];
        assert_eq!(fold("UNIQUE", &values), json!([3, 1]));
        assert_eq!(fold("SORTED_UNIQUE", &values), json!([1, 3]));
        assert_eq!(fold("COUNT_DISTINCT", &values), json!(2));
    }

    #[test]
    fn bitwise() {
        assert_eq!(fold("BIT_AND", &[json!(7), json!(12)]), json!(4));
        assert_eq!(fold("BIT_OR", &[json!(1), json!(null), json!(4)]), json!(5));
        assert_eq!(fold("BIT_XOR", &[json!(3), json!(1)]), json!(2));
        assert_eq!(fold("BIT_OR", &[json!(-1)]), json!(null));
        assert_eq!(fold("BIT_AND", &[]), json!(null));
    }

    #[test]
    fn custom_functions_can_be_registered() {
        struct First(Option<AqlValue>);
        impl Aggregator for First {
            fn reduce(&mut self, value: &AqlValue) {
                if self.0.is_none() {
                    self.0 = Some(value.clone());
                }
            }
            fn finish(&self) -> AqlValue {
                self.0.clone().unwrap_or(AqlValue::Null)
            }
            fn reset(&mut self) {
                self.0 = None;
            }
        }

        let mut registry = AggregatorRegistry::with_defaults();
        assert!(!registry.contains("first"));
        registry.register("first", Arc::new(|| -> Box<dyn Aggregator> { Box::new(First(None)) }));
        let mut agg = registry.create("FIRST").unwrap();
        agg.reduce(&json!("a"));
        agg.reduce(&json!("b"));
        assert_eq!(agg.finish(), json!("a"));
        assert!(matches!(registry.create("nope"), Err(Error::BadParameter(_))));
    }
}
