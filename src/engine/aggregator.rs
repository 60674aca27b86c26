// Copyright © 2024 Pathway

//! Named global reductions, resynchronized once per superstep.
//!
//! Each cell is double-buffered: `current` collects this round's
//! contributions, `last` holds the previous round's merged result and is
//! the only buffer vertex programs can read. Synchronization runs
//! serialize -> all-gather -> reset -> fold every worker's fragment ->
//! swap -> reset, so a read during superstep N observes exactly the merged
//! value of superstep N-1.

use std::collections::{BTreeMap, HashMap};
use std::mem::{replace, swap};

use bincode::{deserialize, serialize};
use log::{debug, warn};

use super::error::{Error, Result};
use super::reduce::{AggregatorKind, Reducer};
use super::value::{Aggregatable, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorCell {
    kind: AggregatorKind,
    current: Value,
    last: Value,
}

impl AggregatorCell {
    pub fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            current: kind.identity(),
            last: kind.identity(),
        }
    }

    pub fn kind(&self) -> AggregatorKind {
        self.kind
    }

    pub fn current(&self) -> &Value {
        &self.current
    }

    pub fn last(&self) -> &Value {
        &self.last
    }

    /// Folds a single element into `current`.
    pub fn aggregate(&mut self, value: Value) -> Result<()> {
        let state = self.kind.reducer.init(value);
        self.merge_state(state)
    }

    /// Folds an already reduced state into `current`.
    pub fn merge_state(&mut self, state: Value) -> Result<()> {
        self.kind.reducer.plus_equals(&mut self.current, state)
    }

    pub fn reset(&mut self) {
        self.current = self.kind.identity();
    }

    pub fn start_new_round(&mut self) {
        swap(&mut self.current, &mut self.last);
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregatorRegistry {
    cells: BTreeMap<String, AggregatorCell>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a reducer. Registering a name twice keeps the first
    /// binding.
    pub fn register(&mut self, name: &str, kind: AggregatorKind) -> Result<()> {
        kind.validate()?;
        if let Some(existing) = self.cells.get(name) {
            if existing.kind != kind {
                warn!(
                    "aggregator {name:?} is already registered as {}, ignoring {kind}",
                    existing.kind
                );
            }
            return Ok(());
        }
        debug!("registered aggregator {name:?} ({kind})");
        self.cells.insert(name.to_owned(), AggregatorCell::new(kind));
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn cell(&self, name: &str) -> Result<&AggregatorCell> {
        self.cells
            .get(name)
            .ok_or_else(|| Error::UnregisteredAggregator(name.to_owned()))
    }

    fn cell_mut(&mut self, name: &str) -> Result<&mut AggregatorCell> {
        self.cells
            .get_mut(name)
            .ok_or_else(|| Error::UnregisteredAggregator(name.to_owned()))
    }

    /// Type-checks `value` against the cell and folds it into `current`.
    pub fn aggregate<T: Aggregatable>(&mut self, name: &str, value: T) -> Result<()> {
        let value = value.into_value();
        let cell = self.cell_mut(name)?;
        check_element(name, cell.kind, &value)?;
        cell.aggregate(value)
    }

    /// Previous round's merged value.
    pub fn get_aggregated_value<T: Aggregatable>(&self, name: &str) -> Result<T> {
        T::from_value(self.cell(name)?.last())
    }

    /// Encodes every cell's `current` state.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let states: Vec<(&str, &Value)> = self
            .cells
            .iter()
            .map(|(name, cell)| (name.as_str(), &cell.current))
            .collect();
        serialize(&states).map_err(Error::Serialization)
    }

    /// Decodes another worker's [`AggregatorRegistry::serialize`] output and
    /// folds it into `current`.
    pub fn deserialize_and_aggregate(&mut self, bytes: &[u8]) -> Result<()> {
        let states: Vec<(String, Value)> =
            deserialize(bytes).map_err(Error::AggregatorCorrupted)?;
        for (name, state) in states {
            let cell = self.cell_mut(&name)?;
            if !cell.kind.accepts_state(&state) {
                return Err(Error::AggregatorTypeMismatch {
                    name,
                    expected: cell.kind.element,
                    actual: state.get_type(),
                });
            }
            cell.merge_state(state)?;
        }
        Ok(())
    }

    /// Folds a thread-local partial into `current`.
    pub fn absorb(&mut self, local: LocalAggregates) -> Result<()> {
        for (name, partial) in local.partials {
            self.cell_mut(&name)?.merge_state(partial.into_state())?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.cells.values_mut().for_each(AggregatorCell::reset);
    }

    pub fn start_new_round(&mut self) {
        self.cells
            .values_mut()
            .for_each(AggregatorCell::start_new_round);
    }

    /// Full round boundary: `gathered` holds every worker's serialized
    /// state (including this worker's own), ordered by fragment id.
    pub fn synchronize<B: AsRef<[u8]>>(&mut self, gathered: &[B]) -> Result<()> {
        self.reset();
        for bytes in gathered {
            self.deserialize_and_aggregate(bytes.as_ref())?;
        }
        self.start_new_round();
        self.reset();
        Ok(())
    }
}

fn check_element(name: &str, kind: AggregatorKind, value: &Value) -> Result<()> {
    let actual = value.get_type();
    if actual == kind.element {
        Ok(())
    } else {
        Err(Error::AggregatorTypeMismatch {
            name: name.to_owned(),
            expected: kind.element,
            actual,
        })
    }
}

/// Per-thread partial accumulator, merged into the registry after the
/// parallel region.
#[derive(Debug, Default)]
pub struct LocalAggregates {
    partials: HashMap<String, Partial>,
}

/// Append partials collect raw elements and are sorted once, when the
/// partial becomes a reducer state.
#[derive(Debug)]
enum Partial {
    State(Value),
    Items(Vec<Value>),
}

impl Partial {
    fn new(kind: AggregatorKind, value: Value) -> Self {
        match kind.reducer {
            Reducer::Append => Self::Items(vec![value]),
            reducer => Self::State(reducer.init(value)),
        }
    }

    fn merge(&mut self, kind: AggregatorKind, other: Self) -> Result<()> {
        match (self, other) {
            (Self::Items(items), Self::Items(other)) => {
                items.extend(other);
                Ok(())
            }
            (Self::State(state), Self::State(other)) => kind.reducer.plus_equals(state, other),
            (this, other) => {
                let state = replace(this, Self::State(Value::None)).into_state();
                *this = Self::State(kind.reducer.combine(state, other.into_state())?);
                Ok(())
            }
        }
    }

    fn into_state(self) -> Value {
        match self {
            Self::State(state) => state,
            Self::Items(mut items) => {
                items.sort();
                Value::Tuple(items.into())
            }
        }
    }
}

impl LocalAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate(
        &mut self,
        registry: &AggregatorRegistry,
        name: &str,
        value: Value,
    ) -> Result<()> {
        let kind = registry.cell(name)?.kind();
        check_element(name, kind, &value)?;
        match self.partials.get_mut(name) {
            Some(Partial::Items(items)) => {
                items.push(value);
                Ok(())
            }
            Some(partial) => partial.merge(kind, Partial::new(kind, value)),
            None => {
                self.partials.insert(name.to_owned(), Partial::new(kind, value));
                Ok(())
            }
        }
    }

    /// Merges another partial of the same registry into this one.
    pub fn merge(&mut self, registry: &AggregatorRegistry, other: Self) -> Result<()> {
        for (name, partial) in other.partials {
            let kind = registry.cell(&name)?.kind();
            if let Some(existing) = self.partials.get_mut(&name) {
                existing.merge(kind, partial)?;
            } else {
                self.partials.insert(name, partial);
            }
        }
        Ok(())
    }
}
