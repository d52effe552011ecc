//! Mapper configuration
//!
//! All options are applied once, while entity models are built. Nothing here
//! is consulted again per encode/decode call except the discriminator key and
//! polymorphism policy, which the codecs read from the built model and the
//! mapper respectively.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

/// Strategy used to derive storage names from logical names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamingStrategy {
    /// Keep the name as declared
    Identity,
    /// `BlogPost` -> `blogPost`
    CamelCase,
    /// `BlogPost` -> `blog_post`
    SnakeCase,
    /// `BlogPost` -> `blog-post`
    KebabCase,
    /// `BlogPost` -> `blogpost`
    LowerCase,
}

impl NamingStrategy {
    /// Apply the strategy to a name
    pub fn apply(&self, name: &str) -> String {
        match self {
            NamingStrategy::Identity => name.to_string(),
            NamingStrategy::CamelCase => name.to_case(Case::Camel),
            NamingStrategy::SnakeCase => name.to_case(Case::Snake),
            NamingStrategy::KebabCase => name.to_case(Case::Kebab),
            NamingStrategy::LowerCase => name.to_lowercase(),
        }
    }
}

/// Function used to compute a type's discriminator value when the type does
/// not declare one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscriminatorFunction {
    /// Fully qualified Rust type path
    ClassName,
    /// Fully qualified Rust type path, lowercased
    LowerClassName,
    /// Declared simple name
    SimpleName,
    /// Declared simple name, lowercased
    LowerSimpleName,
}

impl DiscriminatorFunction {
    /// Compute the discriminator for a type
    pub fn compute(&self, type_path: &str, simple_name: &str) -> String {
        match self {
            DiscriminatorFunction::ClassName => type_path.to_string(),
            DiscriminatorFunction::LowerClassName => type_path.to_lowercase(),
            DiscriminatorFunction::SimpleName => simple_name.to_string(),
            DiscriminatorFunction::LowerSimpleName => simple_name.to_lowercase(),
        }
    }
}

/// Which declared properties are considered during model construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyDiscovery {
    /// Properties declared with `field(..)`
    Fields,
    /// Properties declared with `accessor(..)`
    Methods,
}

/// How reference properties are materialized on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadingPolicy {
    /// Decode an unresolved handle; the target is fetched on dereference
    Lazy,
    /// Fetch the target while decoding
    Eager,
}

/// Binary layout used to store UUIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UuidRepresentation {
    /// Binary subtype 4, RFC 4122 byte order
    Standard,
    /// Binary subtype 3, each 8-byte half reversed
    JavaLegacy,
    /// Binary subtype 3, first three groups little-endian
    CSharpLegacy,
    /// Binary subtype 3, RFC 4122 byte order
    PythonLegacy,
}

/// Time zone applied to date-times that carry none (`chrono::NaiveDateTime`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateStorage {
    /// The local date-time is taken as UTC
    Utc,
    /// The local date-time is taken in the system time zone
    SystemDefault,
}

/// Mapper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    /// Document field holding the discriminator (default: "_t")
    pub discriminator_key: String,
    /// Discriminator function (default: simple name)
    pub discriminator: DiscriminatorFunction,
    /// Property naming strategy (default: identity)
    pub property_naming: NamingStrategy,
    /// Collection naming strategy (default: camelCase)
    pub collection_naming: NamingStrategy,
    /// Property discovery strategy (default: fields)
    pub property_discovery: PropertyDiscovery,
    /// Store null values instead of omitting them
    pub store_nulls: bool,
    /// Store empty lists and maps instead of omitting them
    pub store_empties: bool,
    /// Reject unknown discriminators instead of falling back to the declared type
    pub strict_polymorphism: bool,
    /// Write the discriminator even when the runtime type is the declared type
    pub always_write_discriminator: bool,
    /// Default reference loading policy
    pub reference_loading: LoadingPolicy,
    /// UUID storage layout (default: standard)
    pub uuid_representation: UuidRepresentation,
    /// Zone applied to zone-less date-times (default: UTC)
    pub date_storage: DateStorage,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            discriminator_key: "_t".to_string(),
            discriminator: DiscriminatorFunction::SimpleName,
            property_naming: NamingStrategy::Identity,
            collection_naming: NamingStrategy::CamelCase,
            property_discovery: PropertyDiscovery::Fields,
            store_nulls: false,
            store_empties: false,
            strict_polymorphism: false,
            always_write_discriminator: false,
            reference_loading: LoadingPolicy::Lazy,
            uuid_representation: UuidRepresentation::Standard,
            date_storage: DateStorage::Utc,
        }
    }
}

impl MapperOptions {
    /// Parse options from a JSON string; missing keys take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Set the discriminator key
    pub fn with_discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    /// Set the discriminator function
    pub fn with_discriminator(mut self, function: DiscriminatorFunction) -> Self {
        self.discriminator = function;
        self
    }

    /// Set the property naming strategy
    pub fn with_property_naming(mut self, strategy: NamingStrategy) -> Self {
        self.property_naming = strategy;
        self
    }

    /// Set the collection naming strategy
    pub fn with_collection_naming(mut self, strategy: NamingStrategy) -> Self {
        self.collection_naming = strategy;
        self
    }

    /// Set the property discovery strategy
    pub fn with_property_discovery(mut self, discovery: PropertyDiscovery) -> Self {
        self.property_discovery = discovery;
        self
    }

    /// Store null values
    pub fn with_store_nulls(mut self, store: bool) -> Self {
        self.store_nulls = store;
        self
    }

    /// Store empty lists and maps
    pub fn with_store_empties(mut self, store: bool) -> Self {
        self.store_empties = store;
        self
    }

    /// Enable strict polymorphism
    pub fn with_strict_polymorphism(mut self, strict: bool) -> Self {
        self.strict_polymorphism = strict;
        self
    }

    /// Always write discriminators
    pub fn with_always_write_discriminator(mut self, always: bool) -> Self {
        self.always_write_discriminator = always;
        self
    }

    /// Set the default reference loading policy
    pub fn with_reference_loading(mut self, policy: LoadingPolicy) -> Self {
        self.reference_loading = policy;
        self
    }

    /// Set the UUID storage layout
    pub fn with_uuid_representation(mut self, representation: UuidRepresentation) -> Self {
        self.uuid_representation = representation;
        self
    }

    /// Set the zone applied to zone-less date-times
    pub fn with_date_storage(mut self, storage: DateStorage) -> Self {
        self.date_storage = storage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = MapperOptions::default();
        assert_eq!(options.discriminator_key, "_t");
        assert_eq!(options.discriminator, DiscriminatorFunction::SimpleName);
        assert_eq!(options.property_naming, NamingStrategy::Identity);
        assert_eq!(options.collection_naming, NamingStrategy::CamelCase);
        assert!(!options.store_nulls);
        assert!(!options.store_empties);
        assert!(!options.strict_polymorphism);
        assert_eq!(options.reference_loading, LoadingPolicy::Lazy);
        assert_eq!(options.uuid_representation, UuidRepresentation::Standard);
        assert_eq!(options.date_storage, DateStorage::Utc);
    }

    #[test]
    fn test_storage_options_from_json() {
        let options = MapperOptions::from_json(
            r#"{"uuid_representation": "javaLegacy", "date_storage": "systemDefault"}"#,
        )
        .unwrap();
        assert_eq!(options.uuid_representation, UuidRepresentation::JavaLegacy);
        assert_eq!(options.date_storage, DateStorage::SystemDefault);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let options = MapperOptions::from_json(
            r#"{"discriminator_key": "className", "property_naming": "snakeCase", "strict_polymorphism": true}"#,
        )
        .unwrap();
        assert_eq!(options.discriminator_key, "className");
        assert_eq!(options.property_naming, NamingStrategy::SnakeCase);
        assert!(options.strict_polymorphism);
        assert_eq!(options.collection_naming, NamingStrategy::CamelCase);
    }

    #[test]
    fn test_naming_strategies() {
        assert_eq!(NamingStrategy::Identity.apply("firstName"), "firstName");
        assert_eq!(NamingStrategy::CamelCase.apply("BlogPost"), "blogPost");
        assert_eq!(NamingStrategy::SnakeCase.apply("firstName"), "first_name");
        assert_eq!(NamingStrategy::KebabCase.apply("firstName"), "first-name");
        assert_eq!(NamingStrategy::LowerCase.apply("BlogPost"), "blogpost");
    }

    #[test]
    fn test_discriminator_functions() {
        let path = "shop::model::Circle";
        assert_eq!(DiscriminatorFunction::ClassName.compute(path, "Circle"), path);
        assert_eq!(
            DiscriminatorFunction::LowerClassName.compute(path, "Circle"),
            "shop::model::circle"
        );
        assert_eq!(DiscriminatorFunction::SimpleName.compute(path, "Circle"), "Circle");
        assert_eq!(
            DiscriminatorFunction::LowerSimpleName.compute(path, "Circle"),
            "circle"
        );
    }
}
