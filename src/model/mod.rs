use thiserror::Error;

pub mod descriptor;
pub mod reference;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading module descriptor: {0}")]
    IO(#[from] std::io::Error),
    #[error("Module descriptor is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid hex digest for `{0}`: {1}")]
    Hex(String, hex::FromHexError),
    #[error("Invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },
    #[error("Module {0} cannot require itself")]
    SelfDependency(String),
    #[error("Module {module} has more than one dependence on {dependency}")]
    DuplicateRequires { module: String, dependency: String },
    #[error("Module {module} exports package {package} more than once")]
    DuplicateExports { module: String, package: String },
    #[error("Automatic module {0} cannot declare {1}")]
    AutomaticDeclares(String, &'static str),
    #[error("Provider {provider} of {service} in module {module} has no package")]
    UnnamedProviderPackage {
        module: String,
        service: String,
        provider: String,
    },
}
