use dashmap::DashMap;
use log::debug;
use std::collections::BTreeSet;
use std::fmt;

/// Identifies the sandbox class loader a remapping applies to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

/// Value of a constant that can be hot-swapped
///
/// Floating point values are kept as their bits, so `NaN` constants can still be keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstantLiteral {
    Integer(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    String(String),
}

impl ConstantLiteral {
    pub fn float(value: f32) -> ConstantLiteral {
        ConstantLiteral::Float(value.to_bits())
    }

    pub fn double(value: f64) -> ConstantLiteral {
        ConstantLiteral::Double(value.to_bits())
    }
}

impl fmt::Display for ConstantLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantLiteral::Integer(value) => write!(f, "{}", value),
            ConstantLiteral::Long(value) => write!(f, "{}L", value),
            ConstantLiteral::Float(bits) => write!(f, "{}F", f32::from_bits(*bits)),
            ConstantLiteral::Double(bits) => write!(f, "{}D", f64::from_bits(*bits)),
            ConstantLiteral::String(value) => write!(f, "{:?}", value),
        }
    }
}

/// A constant load: which class and method it is in, and what value it originally loads
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantKey {
    /// Internal name of the class containing the load
    pub class: String,

    /// Name of the method containing the load
    pub method: String,
    pub original: ConstantLiteral,
}

impl ConstantKey {
    pub fn new(
        class: impl Into<String>,
        method: impl Into<String>,
        original: ConstantLiteral,
    ) -> ConstantKey {
        ConstantKey {
            class: class.into(),
            method: method.into(),
            original,
        }
    }
}

/// Current values of hot-swapped constants, per class loader
///
/// Loading threads read the table (through the injected lookup helper and when classes are
/// transformed) while an editor thread applies new values. Reads never block on a global lock:
/// the table is sharded, and each key only ever has one writer.
#[derive(Default)]
pub struct ConstantRemapper {
    values: DashMap<(LoaderId, ConstantKey), ConstantLiteral>,
}

impl ConstantRemapper {
    pub fn new() -> ConstantRemapper {
        ConstantRemapper::default()
    }

    /// Set the value a constant load should produce from now on
    pub fn add_constant(&self, loader: LoaderId, key: ConstantKey, value: ConstantLiteral) {
        debug!("Remapping {} in {}.{} to {}", key.original, key.class, key.method, value);
        self.values.insert((loader, key), value);
    }

    /// Stop remapping a constant (returns the value it was remapped to)
    pub fn remove_constant(&self, loader: LoaderId, key: &ConstantKey) -> Option<ConstantLiteral> {
        self.values
            .remove(&(loader, key.clone()))
            .map(|(_, value)| value)
    }

    /// Forget every remapping of a class loader
    pub fn remove_loader(&self, loader: LoaderId) {
        self.values.retain(|(entry_loader, _), _| *entry_loader != loader);
    }

    /// Value a constant load should produce (`original` unless remapped)
    pub fn lookup(&self, loader: LoaderId, key: &ConstantKey) -> ConstantLiteral {
        self.values
            .get(&(loader, key.clone()))
            .map(|value| value.value().clone())
            .unwrap_or_else(|| key.original.clone())
    }

    pub fn contains(&self, loader: LoaderId, key: &ConstantKey) -> bool {
        self.values.contains_key(&(loader, key.clone()))
    }

    /// Every constant load remapped for a class loader, in a stable order
    pub fn registered_keys(&self, loader: LoaderId) -> BTreeSet<ConstantKey> {
        self.values
            .iter()
            .filter(|entry| entry.key().0 == loader)
            .map(|entry| entry.key().1.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
