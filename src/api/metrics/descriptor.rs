use crate::api::metrics::{InstrumentKind, NumberKind};
use crate::api::Unit;
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// Descriptor contains all the settings that describe an instrument,
/// including its name, metric kind, number kind, and the configurable
/// options.
///
/// Descriptors are created once per instrument and referenced by handle
/// (`Arc`) elsewhere; identity is established by the precomputed hash.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    name: String,
    instrument_kind: InstrumentKind,
    number_kind: NumberKind,
    description: Option<String>,
    unit: Option<Unit>,
    instrumentation_name: &'static str,
    instrumentation_version: Option<&'static str>,
    attribute_hash: u64,
}

impl Descriptor {
    /// Create a new descriptor
    pub fn new(
        name: String,
        instrumentation_name: &'static str,
        instrumentation_version: Option<&'static str>,
        instrument_kind: InstrumentKind,
        number_kind: NumberKind,
    ) -> Self {
        let mut hasher = FnvHasher::default();
        name.hash(&mut hasher);
        instrumentation_name.hash(&mut hasher);
        instrumentation_version.hash(&mut hasher);
        instrument_kind.hash(&mut hasher);
        number_kind.hash(&mut hasher);

        Descriptor {
            name,
            instrument_kind,
            number_kind,
            description: None,
            unit: None,
            instrumentation_name,
            instrumentation_version,
            attribute_hash: hasher.finish(),
        }
    }

    /// The metric instrument's name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The specific kind of instrument.
    pub fn instrument_kind(&self) -> &InstrumentKind {
        &self.instrument_kind
    }

    /// Whether this instrument is declared over `i64`, `u64`, or `f64`
    /// values.
    pub fn number_kind(&self) -> &NumberKind {
        &self.number_kind
    }

    /// A human-readable description of the metric instrument.
    pub fn description(&self) -> Option<&String> {
        self.description.as_ref()
    }

    /// Assign a new description
    pub fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    /// Unit describes the units of the metric instrument.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_ref().map(|unit| unit.as_ref())
    }

    /// Assign a new unit
    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = Some(unit);
    }

    /// The name of the library that provided instrumentation for this
    /// instrument.
    pub fn instrumentation_name(&self) -> &'static str {
        self.instrumentation_name
    }

    /// The version of the instrumentation library, if any.
    pub fn instrumentation_version(&self) -> Option<&'static str> {
        self.instrumentation_version
    }

    /// The pre-computed hash of the descriptor data
    pub fn attribute_hash(&self) -> u64 {
        self.attribute_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_identifies_instrument() {
        let a = Descriptor::new(
            "requests".into(),
            "test",
            None,
            InstrumentKind::Counter,
            NumberKind::U64,
        );
        let same = Descriptor::new(
            "requests".into(),
            "test",
            None,
            InstrumentKind::Counter,
            NumberKind::U64,
        );
        let other = Descriptor::new(
            "requests".into(),
            "test",
            None,
            InstrumentKind::UpDownCounter,
            NumberKind::U64,
        );

        assert_eq!(a.attribute_hash(), same.attribute_hash());
        assert_ne!(a.attribute_hash(), other.attribute_hash());
    }
}
