use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    path::Path,
    sync::OnceLock,
};

use log::{debug, error};
use regex_lite::Regex;
use serde::Deserialize;

use crate::model::ParseError;

const QUALIFIED_NAME: &str = r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$";

fn is_qualified_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(QUALIFIED_NAME).expect("qualified name pattern is valid"))
        .is_match(name)
}

/// Returns the package of a fully qualified type name, `""` for the unnamed package.
pub fn package_name(type_name: &str) -> &str {
    match type_name.rfind('.') {
        Some(index) => &type_name[..index],
        None => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    /// Readability of the dependence is granted to every module reading the declaring one.
    Transitive,
    /// The dependence is only needed at compile time and is not followed during resolution.
    Static,
    Synthetic,
    Mandated,
}

impl Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modifier::Transitive => f.write_str("transitive"),
            Modifier::Static => f.write_str("static"),
            Modifier::Synthetic => f.write_str("synthetic"),
            Modifier::Mandated => f.write_str("mandated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requires {
    name: String,
    modifiers: BTreeSet<Modifier>,
}

impl Requires {
    pub fn new(name: impl Into<String>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Requires {
            name: name.into(),
            modifiers: modifiers.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modifiers(&self) -> &BTreeSet<Modifier> {
        &self.modifiers
    }

    pub fn is_transitive(&self) -> bool {
        self.modifiers.contains(&Modifier::Transitive)
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(&Modifier::Static)
    }
}

impl Display for Requires {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{} ", modifier)?;
        }
        f.write_str(&self.name)
    }
}

/// An exported package, optionally restricted to a set of target modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Exports {
    source: String,
    targets: BTreeSet<String>,
}

impl Exports {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn is_exported_to(&self, module: &str) -> bool {
        !self.is_qualified() || self.targets.contains(module)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Provides {
    service: String,
    providers: Vec<String>,
}

impl Provides {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }
}

/// Hashes recorded by a module for some of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHashes {
    algorithm: String,
    hashes: BTreeMap<String, Vec<u8>>,
}

impl ModuleHashes {
    pub fn new(algorithm: impl Into<String>, hashes: BTreeMap<String, Vec<u8>>) -> Self {
        ModuleHashes {
            algorithm: algorithm.into(),
            hashes,
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(String::as_str)
    }

    pub fn hash_for(&self, name: &str) -> Option<&[u8]> {
        self.hashes.get(name).map(Vec::as_slice)
    }
}

/// A digest of the module content computed ahead of time by whoever packaged it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    pub algorithm: String,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
    name: String,
    automatic: bool,
    requires: Vec<Requires>,
    exports: Vec<Exports>,
    uses: BTreeSet<String>,
    provides: Vec<Provides>,
    packages: BTreeSet<String>,
    target_platform: Option<String>,
    hashes: Option<ModuleHashes>,
    content_hash: Option<ContentHash>,
}

impl ModuleDescriptor {
    pub fn builder(name: impl Into<String>) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder::new(name.into(), false)
    }

    /// Automatic modules read every other module and export all of their packages.
    pub fn automatic(name: impl Into<String>) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder::new(name.into(), true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    /// Dependences in declaration order.
    pub fn requires(&self) -> &[Requires] {
        &self.requires
    }

    pub fn exports(&self) -> &[Exports] {
        &self.exports
    }

    pub fn uses(&self) -> &BTreeSet<String> {
        &self.uses
    }

    pub fn provides(&self) -> &[Provides] {
        &self.provides
    }

    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    pub fn target_platform(&self) -> Option<&str> {
        self.target_platform.as_deref()
    }

    pub fn hashes(&self) -> Option<&ModuleHashes> {
        self.hashes.as_ref()
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn from_file(path: &Path) -> Result<ModuleDescriptor, ParseError> {
        debug!("Attempting to read module descriptor from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let descriptor = ModuleDescriptor::from_toml_str(&contents);
        if let Err(err) = &descriptor {
            error!(
                "Could not build a valid module descriptor from {} due to err {err}",
                path.display()
            )
        }
        descriptor
    }

    pub fn from_toml_str(data: &str) -> Result<ModuleDescriptor, ParseError> {
        let raw = toml::from_str::<RawDescriptor>(data)?;
        raw.into_descriptor()
    }
}

impl Display for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.automatic {
            f.write_str("automatic ")?;
        }
        write!(f, "module {} {{ ", self.name)?;
        for requires in &self.requires {
            write!(f, "requires {}; ", requires)?;
        }
        for exports in &self.exports {
            write!(f, "exports {}; ", exports.source)?;
        }
        f.write_str("}")
    }
}

pub struct ModuleDescriptorBuilder {
    name: String,
    automatic: bool,
    requires: Vec<Requires>,
    exports: Vec<Exports>,
    uses: BTreeSet<String>,
    provides: Vec<Provides>,
    packages: BTreeSet<String>,
    target_platform: Option<String>,
    hashes: Option<ModuleHashes>,
    content_hash: Option<ContentHash>,
}

impl ModuleDescriptorBuilder {
    fn new(name: String, automatic: bool) -> Self {
        ModuleDescriptorBuilder {
            name,
            automatic,
            requires: Vec::new(),
            exports: Vec::new(),
            uses: BTreeSet::new(),
            provides: Vec::new(),
            packages: BTreeSet::new(),
            target_platform: None,
            hashes: None,
            content_hash: None,
        }
    }

    pub fn requires(self, name: impl Into<String>) -> Self {
        self.requires_with(name, [])
    }

    pub fn requires_transitive(self, name: impl Into<String>) -> Self {
        self.requires_with(name, [Modifier::Transitive])
    }

    pub fn requires_static(self, name: impl Into<String>) -> Self {
        self.requires_with(name, [Modifier::Static])
    }

    pub fn requires_with(
        mut self,
        name: impl Into<String>,
        modifiers: impl IntoIterator<Item = Modifier>,
    ) -> Self {
        self.requires.push(Requires::new(name, modifiers));
        self
    }

    /// Unqualified export.
    pub fn exports(self, package: impl Into<String>) -> Self {
        self.exports_to(package, Vec::<String>::new())
    }

    pub fn exports_to<S: Into<String>>(
        mut self,
        package: impl Into<String>,
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        self.exports.push(Exports {
            source: package.into(),
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn uses(mut self, service: impl Into<String>) -> Self {
        self.uses.insert(service.into());
        self
    }

    pub fn provides<S: Into<String>>(
        mut self,
        service: impl Into<String>,
        providers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.provides.push(Provides {
            service: service.into(),
            providers: providers.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.packages.insert(package.into());
        self
    }

    pub fn packages<S: Into<String>>(mut self, packages: impl IntoIterator<Item = S>) -> Self {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn target_platform(mut self, platform: impl Into<String>) -> Self {
        self.target_platform = Some(platform.into());
        self
    }

    pub fn hashes(mut self, hashes: ModuleHashes) -> Self {
        self.hashes = Some(hashes);
        self
    }

    pub fn content_hash(mut self, algorithm: impl Into<String>, digest: Vec<u8>) -> Self {
        self.content_hash = Some(ContentHash {
            algorithm: algorithm.into(),
            digest,
        });
        self
    }

    pub fn build(self) -> Result<ModuleDescriptor, ParseError> {
        let Self {
            name,
            automatic,
            requires,
            exports,
            uses,
            provides,
            mut packages,
            target_platform,
            hashes,
            content_hash,
        } = self;

        check_name("module", &name)?;

        if automatic {
            if !requires.is_empty() {
                return Err(ParseError::AutomaticDeclares(name, "requires"));
            }
            if !exports.is_empty() {
                return Err(ParseError::AutomaticDeclares(name, "exports"));
            }
            if !uses.is_empty() {
                return Err(ParseError::AutomaticDeclares(name, "uses"));
            }
        }

        let mut required = BTreeSet::new();
        for dependence in &requires {
            check_name("module", dependence.name())?;
            if dependence.name() == name {
                return Err(ParseError::SelfDependency(name));
            }
            if !required.insert(dependence.name()) {
                return Err(ParseError::DuplicateRequires {
                    module: name.clone(),
                    dependency: dependence.name().to_owned(),
                });
            }
        }

        let mut exported = BTreeSet::new();
        for export in &exports {
            check_name("package", export.source())?;
            for target in export.targets() {
                check_name("module", target)?;
            }
            if !exported.insert(export.source()) {
                return Err(ParseError::DuplicateExports {
                    module: name.clone(),
                    package: export.source().to_owned(),
                });
            }
            packages.insert(export.source().to_owned());
        }

        for service in &uses {
            check_name("service", service)?;
        }

        for provides in &provides {
            check_name("service", provides.service())?;
            for provider in provides.providers() {
                check_name("provider", provider)?;
                let package = package_name(provider);
                if package.is_empty() {
                    return Err(ParseError::UnnamedProviderPackage {
                        module: name.clone(),
                        service: provides.service().to_owned(),
                        provider: provider.clone(),
                    });
                }
                packages.insert(package.to_owned());
            }
        }

        for package in &packages {
            check_name("package", package)?;
        }

        Ok(ModuleDescriptor {
            name,
            automatic,
            requires,
            exports,
            uses,
            provides,
            packages,
            target_platform,
            hashes,
            content_hash,
        })
    }
}

fn check_name(kind: &'static str, name: &str) -> Result<(), ParseError> {
    if is_qualified_name(name) {
        Ok(())
    } else {
        Err(ParseError::InvalidName {
            kind,
            name: name.to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    automatic: bool,
    #[serde(default)]
    packages: Vec<String>,
    #[serde(default)]
    uses: Vec<String>,
    target_platform: Option<String>,
    #[serde(default)]
    requires: Vec<RawRequires>,
    #[serde(default)]
    exports: Vec<RawExports>,
    #[serde(default)]
    provides: Vec<RawProvides>,
    hashes: Option<RawHashes>,
    content_hash: Option<RawContentHash>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequires {
    name: String,
    #[serde(default)]
    transitive: bool,
    #[serde(default, rename = "static")]
    static_only: bool,
    #[serde(default)]
    synthetic: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExports {
    package: String,
    #[serde(default)]
    to: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProvides {
    service: String,
    with: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHashes {
    algorithm: String,
    #[serde(default)]
    modules: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawContentHash {
    algorithm: String,
    digest: String,
}

impl RawDescriptor {
    fn into_descriptor(self) -> Result<ModuleDescriptor, ParseError> {
        let content_hash = match self.content_hash {
            Some(hash) => match hex::decode(&hash.digest) {
                Ok(digest) => Some((hash.algorithm, digest)),
                Err(err) => return Err(ParseError::Hex(self.name, err)),
            },
            None => None,
        };

        let mut builder = ModuleDescriptorBuilder::new(self.name, self.automatic)
            .packages(self.packages);
        if let Some((algorithm, digest)) = content_hash {
            builder = builder.content_hash(algorithm, digest);
        }

        for service in self.uses {
            builder = builder.uses(service);
        }
        if let Some(platform) = self.target_platform {
            builder = builder.target_platform(platform);
        }
        for requires in self.requires {
            let modifiers = [
                (requires.transitive, Modifier::Transitive),
                (requires.static_only, Modifier::Static),
                (requires.synthetic, Modifier::Synthetic),
            ]
            .into_iter()
            .filter_map(|(set, modifier)| set.then_some(modifier));
            builder = builder.requires_with(requires.name, modifiers);
        }
        for exports in self.exports {
            builder = builder.exports_to(exports.package, exports.to);
        }
        for provides in self.provides {
            builder = builder.provides(provides.service, provides.with);
        }
        if let Some(hashes) = self.hashes {
            let decoded = hashes
                .modules
                .into_iter()
                .map(|(name, digest)| match hex::decode(&digest) {
                    Ok(bytes) => Ok((name, bytes)),
                    Err(err) => Err(ParseError::Hex(name, err)),
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            builder = builder.hashes(ModuleHashes::new(hashes.algorithm, decoded));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn package_of_type_name() {
        assert_eq!(package_name("com.example.spi.Codec"), "com.example.spi");
        assert_eq!(package_name("Codec"), "");
    }

    #[test]
    fn load_valid_descriptor() {
        let str = r#"
            name = "com.example.app"
            packages = ["com.example.app.internal"]
            uses = ["com.example.spi.Codec"]
            target_platform = "linux-amd64"

            [[requires]]
            name = "com.example.lib"
            transitive = true

            [[requires]]
            name = "com.example.annotations"
            static = true

            [[exports]]
            package = "com.example.app.api"

            [[exports]]
            package = "com.example.app.spi"
            to = ["com.example.friend"]

            [[provides]]
            service = "com.example.spi.Codec"
            with = ["com.example.app.codec.Zstd"]

            [hashes]
            algorithm = "SHA-256"
            [hashes.modules]
            "com.example.lib" = "00ff10"
        "#;
        let expected = ModuleDescriptor::builder("com.example.app")
            .package("com.example.app.internal")
            .uses("com.example.spi.Codec")
            .target_platform("linux-amd64")
            .requires_transitive("com.example.lib")
            .requires_static("com.example.annotations")
            .exports("com.example.app.api")
            .exports_to("com.example.app.spi", ["com.example.friend"])
            .provides("com.example.spi.Codec", ["com.example.app.codec.Zstd"])
            .hashes(ModuleHashes::new(
                "SHA-256",
                BTreeMap::from([("com.example.lib".to_owned(), vec![0x00, 0xff, 0x10])]),
            ))
            .build()
            .unwrap();

        let parsed = ModuleDescriptor::from_toml_str(str).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(
            parsed.packages().iter().map(String::as_str).collect::<Vec<_>>(),
            vec![
                "com.example.app.api",
                "com.example.app.codec",
                "com.example.app.internal",
                "com.example.app.spi",
            ]
        );
        assert!(parsed.requires()[0].is_transitive());
        assert!(parsed.requires()[1].is_static());
    }

    #[test]
    fn load_automatic_descriptor() {
        let str = r#"
            name = "legacy.util"
            automatic = true
            packages = ["legacy.util", "legacy.util.io"]
        "#;
        let parsed = ModuleDescriptor::from_toml_str(str).unwrap();
        assert!(parsed.is_automatic());
        assert_eq!(parsed.packages().len(), 2);
    }

    #[test]
    fn load_invalid_hex_digest() {
        let str = r#"
            name = "app"
            [hashes]
            algorithm = "SHA-256"
            [hashes.modules]
            lib = "not-hex"
        "#;
        assert!(matches!(
            ModuleDescriptor::from_toml_str(str),
            Err(ParseError::Hex(name, _)) if name == "lib"
        ));
    }

    #[test]
    fn load_content_hash() {
        let str = r#"
            name = "lib"
            [content_hash]
            algorithm = "SHA-256"
            digest = "0a0b0c"
        "#;
        let parsed = ModuleDescriptor::from_toml_str(str).unwrap();
        assert_eq!(
            parsed.content_hash(),
            Some(&ContentHash {
                algorithm: "SHA-256".to_owned(),
                digest: vec![0x0a, 0x0b, 0x0c],
            })
        );

        let invalid = r#"
            name = "lib"
            [content_hash]
            algorithm = "SHA-256"
            digest = "zz"
        "#;
        assert!(matches!(
            ModuleDescriptor::from_toml_str(invalid),
            Err(ParseError::Hex(name, _)) if name == "lib"
        ));
    }

    #[test]
    fn load_unknown_key() {
        let str = r#"
            name = "app"
            version = "1.0"
        "#;
        assert!(ModuleDescriptor::from_toml_str(str).is_err());
    }

    #[test]
    fn reject_invalid_names() {
        assert!(ModuleDescriptor::builder("1app").build().is_err());
        assert!(ModuleDescriptor::builder("app..core").build().is_err());
        assert!(ModuleDescriptor::builder("app")
            .exports("api-v2")
            .build()
            .is_err());
    }

    #[test]
    fn reject_self_and_duplicate_requires() {
        assert!(matches!(
            ModuleDescriptor::builder("a").requires("a").build(),
            Err(ParseError::SelfDependency(_))
        ));
        assert!(matches!(
            ModuleDescriptor::builder("a")
                .requires("b")
                .requires_transitive("b")
                .build(),
            Err(ParseError::DuplicateRequires { .. })
        ));
    }

    #[test]
    fn reject_automatic_with_requires() {
        assert!(matches!(
            ModuleDescriptor::automatic("x").requires("y").build(),
            Err(ParseError::AutomaticDeclares(_, "requires"))
        ));
    }

    #[test]
    fn qualified_exports() {
        let descriptor = ModuleDescriptor::builder("m")
            .exports_to("p.q", ["friend"])
            .exports("p.r")
            .build()
            .unwrap();
        let qualified = &descriptor.exports()[0];
        assert!(qualified.is_qualified());
        assert!(qualified.is_exported_to("friend"));
        assert!(!qualified.is_exported_to("stranger"));
        assert!(descriptor.exports()[1].is_exported_to("stranger"));
    }
}
