// Copyright 2016 Mozilla Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use directories::ProjectDirs;
use fs_err as fs;
use regex::Regex;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::*;

const APP_NAME: &str = "objcache";
const TEN_GIGS: u64 = 10 * 1024 * 1024 * 1024;

pub fn default_disk_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.cache_dir().to_owned())
        .unwrap_or_else(|| env::temp_dir().join(APP_NAME))
}

fn default_disk_cache_size() -> u64 {
    TEN_GIGS
}

/// Parse a human readable size such as `10G` or `512M`.
pub fn parse_size(val: &str) -> Option<u64> {
    let re = Regex::new(r"^(\d+)([KMGT])$").ok()?;
    re.captures(val)
        .and_then(|caps| {
            caps.get(1)
                .and_then(|size| u64::from_str(size.as_str()).ok())
                .map(|size| (size, caps.get(2)))
        })
        .and_then(|(size, suffix)| {
            let multiplier: u64 = match suffix.map(|s| s.as_str()) {
                Some("K") => 1024,
                Some("M") => 1024 * 1024,
                Some("G") => 1024 * 1024 * 1024,
                Some("T") => 1024 * 1024 * 1024 * 1024,
                _ => return None,
            };
            size.checked_mul(multiplier)
        })
}

/// Accept either a byte count or a human readable size in config files.
fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Human(String),
    }
    match Size::deserialize(deserializer)? {
        Size::Bytes(b) => Ok(b),
        Size::Human(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size `{}`", s))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct DiskCacheConfig {
    pub dir: PathBuf,
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        DiskCacheConfig {
            dir: default_disk_cache_dir(),
            size: default_disk_cache_size(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct CacheConfigs {
    pub disk: DiskCacheConfig,
}

/// The contents of the config file. Everything is optional.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct FileConfig {
    pub cache: CacheConfigs,
    pub disable: bool,
    pub read_only: bool,
    pub verify_hits: bool,
    pub temp_dir: Option<PathBuf>,
}

// If the file doesn't exist or we can't read it, log the issue and proceed. If the
// config exists but doesn't parse then something is wrong - return an error.
pub fn try_read_config_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    debug!("Attempting to read config file at {:?}", path);
    let string = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            debug!("Couldn't read config file: {}", e);
            return Ok(None);
        }
    };

    let res = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&string)
            .with_context(|| format!("Failed to load json config file from {}", path.display()))?
    } else {
        toml::from_str(&string)
            .with_context(|| format!("Failed to load toml config file from {}", path.display()))?
    };

    Ok(Some(res))
}

/// Settings taken from `OBJCACHE_*` environment variables.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    dir: Option<PathBuf>,
    size: Option<u64>,
    disable: Option<bool>,
    read_only: Option<bool>,
    verify_hits: Option<bool>,
    temp_dir: Option<PathBuf>,
}

fn bool_from_env(var: &str) -> Option<bool> {
    let val = env::var(var).ok()?;
    match val.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring {}={:?}, expected a boolean", var, val);
            None
        }
    }
}

fn config_from_env() -> EnvConfig {
    let size = env::var("OBJCACHE_CACHE_SIZE").ok().and_then(|v| {
        let size = parse_size(&v);
        if size.is_none() {
            warn!("Ignoring OBJCACHE_CACHE_SIZE={:?}, expected e.g. 10G", v);
        }
        size
    });
    EnvConfig {
        dir: env::var_os("OBJCACHE_DIR").map(PathBuf::from),
        size,
        disable: bool_from_env("OBJCACHE_DISABLE"),
        read_only: bool_from_env("OBJCACHE_READ_ONLY"),
        verify_hits: bool_from_env("OBJCACHE_VERIFY_HITS"),
        temp_dir: env::var_os("OBJCACHE_TEMP_DIR").map(PathBuf::from),
    }
}

/// The location of the config file.
pub fn file_config_path() -> Option<PathBuf> {
    env::var_os("OBJCACHE_CONF").map(PathBuf::from).or_else(|| {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config"))
    })
}

/// The resolved configuration.
// TOML requires the plain values before the `cache` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Never handle a command, always run it as is.
    pub disable: bool,
    /// Look entries up but never store new ones.
    pub read_only: bool,
    /// Check stored objects against their recorded digest before using them.
    pub verify_hits: bool,
    /// Where preprocessor output files go.
    pub temp_dir: PathBuf,
    pub cache: CacheConfigs,
}

impl Config {
    /// Load the config file, if any, and apply environment overrides.
    pub fn load() -> Result<Config> {
        let env_conf = config_from_env();
        let file_conf = match file_config_path() {
            Some(path) => try_read_config_file(&path)
                .context("Failed to load config file")?
                .unwrap_or_default(),
            None => FileConfig::default(),
        };
        Ok(Config::from_env_and_file_configs(env_conf, file_conf))
    }

    /// The configuration from the environment alone.
    pub fn from_env() -> Config {
        Config::from_env_and_file_configs(config_from_env(), FileConfig::default())
    }

    fn from_env_and_file_configs(env_conf: EnvConfig, file_conf: FileConfig) -> Config {
        let FileConfig {
            cache: CacheConfigs { mut disk },
            disable,
            read_only,
            verify_hits,
            temp_dir,
        } = file_conf;
        if let Some(dir) = env_conf.dir {
            disk.dir = dir;
        }
        if let Some(size) = env_conf.size {
            disk.size = size;
        }
        Config {
            disable: env_conf.disable.unwrap_or(disable),
            read_only: env_conf.read_only.unwrap_or(read_only),
            verify_hits: env_conf.verify_hits.unwrap_or(verify_hits),
            temp_dir: env_conf
                .temp_dir
                .or(temp_dir)
                .unwrap_or_else(env::temp_dir),
            cache: CacheConfigs { disk },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_size() {
        assert_eq!(None, parse_size(""));
        assert_eq!(None, parse_size("100"));
        assert_eq!(None, parse_size("10g"));
        assert_eq!(Some(2048), parse_size("2K"));
        assert_eq!(Some(10 * 1024 * 1024), parse_size("10M"));
        assert_eq!(Some(TEN_GIGS), parse_size("10G"));
        assert_eq!(Some(1024 * TEN_GIGS), parse_size("10T"));
    }

    #[test]
    fn test_parse_size_overflow() {
        assert_eq!(None, parse_size("99999999999T"));
        assert_eq!(None, parse_size("18446744073709551616K"));
        assert_eq!(Some(16_777_215 * 1024 * 1024 * 1024 * 1024), parse_size("16777215T"));
        assert_eq!(None, parse_size("16777216T"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_and_file_configs(EnvConfig::default(), FileConfig::default());
        assert!(!config.disable);
        assert!(!config.read_only);
        assert!(!config.verify_hits);
        assert_eq!(TEN_GIGS, config.cache.disk.size);
        assert_eq!(default_disk_cache_dir(), config.cache.disk.dir);
        assert_eq!(env::temp_dir(), config.temp_dir);
    }

    #[test]
    fn test_config_overrides() {
        let env_conf = EnvConfig {
            dir: Some("/env-cache".into()),
            read_only: Some(false),
            verify_hits: Some(true),
            ..Default::default()
        };
        let file_conf = FileConfig {
            cache: CacheConfigs {
                disk: DiskCacheConfig {
                    dir: "/file-cache".into(),
                    size: 5,
                },
            },
            read_only: true,
            temp_dir: Some("/file-tmp".into()),
            ..Default::default()
        };
        assert_eq!(
            Config::from_env_and_file_configs(env_conf, file_conf),
            Config {
                disable: false,
                read_only: false,
                verify_hits: true,
                temp_dir: "/file-tmp".into(),
                cache: CacheConfigs {
                    disk: DiskCacheConfig {
                        dir: "/env-cache".into(),
                        size: 5,
                    },
                },
            }
        );
    }

    #[test]
    fn test_parse_toml_file() {
        let file: FileConfig = toml::from_str(
            r#"
read_only = true

[cache.disk]
dir = "/var/cache/objcache"
size = "2G"
"#,
        )
        .unwrap();
        assert!(file.read_only);
        assert!(!file.verify_hits);
        assert_eq!(PathBuf::from("/var/cache/objcache"), file.cache.disk.dir);
        assert_eq!(2 * 1024 * 1024 * 1024, file.cache.disk.size);

        let file: FileConfig = toml::from_str("[cache.disk]\nsize = 1024\n").unwrap();
        assert_eq!(1024, file.cache.disk.size);
        assert_eq!(default_disk_cache_dir(), file.cache.disk.dir);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(toml::from_str::<FileConfig>("[cache.s3]\nbucket = \"x\"\n").is_err());
        assert!(toml::from_str::<FileConfig>("[cache.disk]\nsize = \"lots\"\n").is_err());
    }

    #[test]
    fn test_try_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert_eq!(None, try_read_config_file::<FileConfig>(&missing).unwrap());

        let bad = dir.path().join("bad");
        fs::write(&bad, "verify_hits = maybe").unwrap();
        assert!(try_read_config_file::<FileConfig>(&bad).is_err());

        let json = dir.path().join("config.json");
        fs::write(&json, r#"{"disable": true}"#).unwrap();
        let file: FileConfig = try_read_config_file(&json).unwrap().unwrap();
        assert!(file.disable);
    }

    #[test]
    fn test_show_config_is_toml() {
        let config = Config::from_env_and_file_configs(EnvConfig::default(), FileConfig::default());
        let s = toml::to_string(&config).unwrap();
        assert!(s.contains("verify_hits = false"), "{}", s);
        assert!(s.contains("[cache.disk]"), "{}", s);
    }

    #[test]
    #[serial]
    fn test_load_from_env_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("config");
        fs::write(&conf, "verify_hits = true\n[cache.disk]\nsize = \"1G\"\n").unwrap();
        env::set_var("OBJCACHE_CONF", &conf);
        env::set_var("OBJCACHE_DIR", dir.path().join("cache"));
        env::set_var("OBJCACHE_CACHE_SIZE", "3M");
        env::set_var("OBJCACHE_READ_ONLY", "1");
        let config = Config::load();
        for var in [
            "OBJCACHE_CONF",
            "OBJCACHE_DIR",
            "OBJCACHE_CACHE_SIZE",
            "OBJCACHE_READ_ONLY",
        ] {
            env::remove_var(var);
        }
        let config = config.unwrap();
        assert!(config.verify_hits);
        assert!(config.read_only);
        assert_eq!(dir.path().join("cache"), config.cache.disk.dir);
        assert_eq!(3 * 1024 * 1024, config.cache.disk.size);
    }

    #[test]
    #[serial]
    fn test_unparseable_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("config");
        fs::write(&conf, "[cache\n").unwrap();
        env::set_var("OBJCACHE_CONF", &conf);
        let res = Config::load();
        env::remove_var("OBJCACHE_CONF");
        assert!(res.is_err());
    }
}
