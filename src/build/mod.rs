mod info;
mod installer;
mod resolver;

pub use crate::build::info::BuildInfo;
pub use crate::build::installer::BuildInstaller;
pub use crate::build::resolver::{ArtifactHost, BuildResolver, HttpArtifactHost};

#[cfg(test)]
pub use crate::build::resolver::test::FakeArtifactHost;
