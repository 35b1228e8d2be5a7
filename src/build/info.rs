use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Identity of an installed build, read from its `application.ini`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
    pub build_id: String,
    /// last component of `SourceRepository`
    pub branch: String,
    pub revision: String,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} id: {} revision: {}",
            self.name, self.version, self.branch, self.build_id, self.revision
        )
    }
}

/// key/values of the `[App]` section
fn app_section(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut in_app = false;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_app = &line[1..line.len() - 1] == "App";
            continue;
        }
        if !in_app {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    values
}

impl BuildInfo {
    /// Parse the content of an `application.ini` file.
    pub fn parse(content: &str) -> Result<Self, String> {
        let values = app_section(content);
        let get = |key: &str| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| format!("application.ini has no App.{}", key))
        };
        let repository = get("SourceRepository")?;
        let branch = repository
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            name: get("name")?,
            version: get("version")?,
            build_id: get("buildID")?,
            branch,
            revision: get("SourceStamp")?,
        })
    }

    /// Read `application.ini` out of the build archive at `path`.
    ///
    /// Blocking, run it with `spawn_blocking`.
    pub fn from_archive(path: &Path) -> Result<Self, String> {
        let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
        let entry_name = archive
            .file_names()
            .filter(|name| *name == "application.ini" || name.ends_with("/application.ini"))
            .min_by_key(|name| name.len())
            .map(str::to_string)
            .ok_or_else(|| "no application.ini in the build".to_string())?;
        let mut entry = archive.by_name(&entry_name).map_err(|e| e.to_string())?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| e.to_string())?;
        Self::parse(&content)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::io::Write;

    pub const APPLICATION_INI: &str = "\
[App]
Vendor=Mozilla
Name=Firefox
name=Firefox
version=26.0a1
buildID=20130910030203
SourceRepository=https://hg.mozilla.org/mozilla-central
SourceStamp=a1b2c3d4e5f6

[Gecko]
MinVersion=26.0a1
";

    /// Zip archive containing `core/application.ini`.
    pub fn build_archive(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("core/firefox.exe", options).unwrap();
        writer.write_all(b"MZ").unwrap();
        writer.start_file("core/application.ini", options).unwrap();
        writer.write_all(APPLICATION_INI.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    fn expected() -> BuildInfo {
        BuildInfo {
            name: "Firefox".to_string(),
            version: "26.0a1".to_string(),
            build_id: "20130910030203".to_string(),
            branch: "mozilla-central".to_string(),
            revision: "a1b2c3d4e5f6".to_string(),
        }
    }

    #[test]
    fn test_parse_application_ini() {
        let info = BuildInfo::parse(APPLICATION_INI).unwrap();
        assert_eq!(info, expected());
        assert_eq!(
            info.to_string(),
            "Firefox 26.0a1 mozilla-central id: 20130910030203 revision: a1b2c3d4e5f6"
        );
        assert!(BuildInfo::parse("[Gecko]\nname=Firefox\n").is_err());
    }

    #[test]
    fn test_read_from_archive() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("firefox-installer.exe");
        build_archive(&path);
        assert_eq!(BuildInfo::from_archive(&path).unwrap(), expected());

        std::fs::write(&path, b"not a zip").unwrap();
        assert!(BuildInfo::from_archive(&path).is_err());
    }
}
