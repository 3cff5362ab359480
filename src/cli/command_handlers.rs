use std::io::Write;

use log::{debug, info};

use crate::{
    catalog::ModuleCatalog,
    graph::Configuration,
    resolver::Resolver,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub bind: bool,
    pub trace: bool,
    pub check: bool,
}

/// Handler to resolve command
/// Resolves the roots on top of the empty configuration and writes every resolved module
/// followed by the modules it reads
pub fn do_resolve(
    before: &dyn ModuleCatalog,
    after: &dyn ModuleCatalog,
    roots: &[String],
    options: ResolveOptions,
    out: &mut dyn Write,
) -> anyhow::Result<Configuration> {
    let mut resolver = Resolver::new(before, &[Configuration::empty()], after)?;
    if options.trace {
        resolver = resolver.with_trace(|line| info!("{}", line));
    }

    debug!("Resolving {}", roots.join(", "));
    resolver.resolve(roots)?;
    if options.bind {
        debug!("Binding services...");
        resolver.bind()?;
    }
    let configuration = Configuration::new(resolver, options.check)?;
    info!(
        "Resolved {} modules in configuration {}",
        configuration.modules().len(),
        configuration.id()
    );

    write_configuration(&configuration, out)?;
    Ok(configuration)
}

/// Handler to list command
pub fn do_list(catalog: &dyn ModuleCatalog, out: &mut dyn Write) -> anyhow::Result<()> {
    let references = catalog.find_all()?;
    info!("Found {} modules", references.len());
    for reference in references {
        writeln!(out, "{}", reference)?;
    }
    Ok(())
}

fn write_configuration(configuration: &Configuration, out: &mut dyn Write) -> anyhow::Result<()> {
    if let Some(platform) = configuration.target_platform() {
        writeln!(out, "target platform {}", platform)?;
    }
    for module in configuration.modules() {
        writeln!(out, "{}", module.reference())?;
        for read in module.reads() {
            writeln!(out, "  reads {}", read.name())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use crate::catalog::{DirectoryCatalog, InMemoryCatalog};

    fn sample_catalog() -> DirectoryCatalog {
        DirectoryCatalog::new(sample_dir())
    }

    fn sample_dir() -> PathBuf {
        project_root::get_project_root()
            .unwrap()
            .join("resources/catalog")
    }

    fn strip_locations(output: &[u8]) -> String {
        let location = format!(" (file://{}/", sample_dir().display());
        String::from_utf8_lossy(output)
            .replace(&location, " (")
    }

    #[test]
    fn resolve_sample_catalog() {
        let mut out = Vec::new();
        let configuration = do_resolve(
            &sample_catalog(),
            &InMemoryCatalog::empty(),
            &["org.sample.app".to_owned()],
            ResolveOptions {
                check: true,
                ..Default::default()
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(
            configuration.to_string(),
            "org.sample.app, org.sample.core, org.sample.legacy"
        );
        assert_eq!(
            strip_locations(&out),
            "org.sample.app (app.toml)
  reads org.sample.core
  reads org.sample.legacy
org.sample.core (core.toml)
org.sample.legacy (legacy.toml)
  reads org.sample.app
  reads org.sample.core
"
        );
    }

    #[test]
    fn resolve_and_bind_sample_catalog() {
        let mut out = Vec::new();
        let configuration = do_resolve(
            &sample_catalog(),
            &InMemoryCatalog::empty(),
            &["org.sample.app".to_owned()],
            ResolveOptions {
                bind: true,
                trace: true,
                check: true,
            },
            &mut out,
        )
        .unwrap();
        let codec = configuration.find_module("org.sample.codec").unwrap();
        assert_eq!(
            codec
                .reads()
                .iter()
                .map(|module| module.name().to_owned())
                .collect::<Vec<_>>(),
            vec!["org.sample.core"]
        );
        let legacy = configuration.find_module("org.sample.legacy").unwrap();
        assert_eq!(legacy.reads().len(), 3);
    }

    #[test]
    fn resolve_missing_root() {
        let mut out = Vec::new();
        let err = do_resolve(
            &sample_catalog(),
            &InMemoryCatalog::empty(),
            &["org.sample.nowhere".to_owned()],
            ResolveOptions::default(),
            &mut out,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Module org.sample.nowhere not found");
        assert!(out.is_empty());
    }

    #[test]
    fn list_sample_catalog() {
        let mut out = Vec::new();
        do_list(&sample_catalog(), &mut out).unwrap();
        assert_eq!(
            strip_locations(&out),
            "org.sample.app (app.toml)
org.sample.codec (codec.toml)
org.sample.core (core.toml)
org.sample.legacy (legacy.toml)
"
        );
    }
}
