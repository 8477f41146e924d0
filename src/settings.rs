// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use config::{Config, ConfigError, File};
use lazy_static::*;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, metadata, File as FsFile};
use std::io::Write;
use std::path::PathBuf;
use struct_field_names_as_array::FieldNamesAsArray;

lazy_static! {
    pub static ref SETTINGS: Settings = Settings::new().unwrap_or_else(|err| {
        error!("Failed to load configuration, using defaults! Reason: {:#?}", err);
        Settings::default()
    });
}

#[derive(Debug, Serialize, Deserialize, Default, FieldNamesAsArray)]
pub struct Settings {
    /// Node settings.
    pub node: Node,

    /// Zerocoin settings.
    pub zerocoin: Zerocoin,

    /// RingCT settings.
    pub ringct: RingCt,
}

fn config_root() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
    path.push("Veil");
    path
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut config_path = config_root();
        config_path.push("config.toml");
        let default_settings = Settings::default();

        // Create default configuration
        if metadata(&config_path).is_err() {
            match toml::ser::to_string_pretty(&default_settings) {
                Ok(settings_str) => {
                    let created = config_path
                        .parent()
                        .map(create_dir_all)
                        .unwrap_or(Ok(()))
                        .and_then(|_| FsFile::create(&config_path));

                    match created {
                        Ok(mut file) => {
                            file.write_all(settings_str.as_bytes()).unwrap_or(());
                        }
                        Err(err) => {
                            // If this fails, do nothing and fall back to envionment variables
                            error!("Failed to create configuration! Reason: {:#?}", err);
                        }
                    }
                }
                Err(err) => {
                    error!("Failed to serialize default configuration! Reason: {:#?}", err);
                }
            }
        }

        let prefix = "veil";
        let env_source: Vec<_> = std::env::vars().collect();
        let mut s = Config::builder().add_source(
            File::with_name(&config_path.to_string_lossy()).required(false),
        );

        // Set defaults
        let defaults_value = serde_yaml::to_value(&default_settings)
            .map_err(|err| ConfigError::Message(err.to_string()))?;
        let defaults: HashMap<String, HashMap<String, DynamicConfVal>> =
            serde_yaml::from_value(defaults_value)
                .map_err(|err| ConfigError::Message(err.to_string()))?;
        for (k1, inner) in &defaults {
            for (k2, v) in inner {
                match v {
                    DynamicConfVal::String(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.as_str())?;
                    }

                    DynamicConfVal::Bool(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }

                    DynamicConfVal::Signed(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }

                    DynamicConfVal::Unsigned(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }
                }
            }
        }

        // Make sure to list these in order
        let settings_modules: Vec<_> = vec![
            Node::FIELD_NAMES_AS_ARRAY,
            Zerocoin::FIELD_NAMES_AS_ARRAY,
            RingCt::FIELD_NAMES_AS_ARRAY,
        ];

        // Gather all possible settings keys
        let possible_keys: HashMap<String, &str> = Settings::FIELD_NAMES_AS_ARRAY
            .iter()
            .enumerate()
            .flat_map(|(i, field)| {
                settings_modules[i].iter().map(|nested| {
                    (
                        format!(
                            "{}_{}_{}",
                            prefix,
                            field.to_owned(),
                            nested.split('_').collect::<Vec<_>>().join("")
                        ),
                        *nested,
                    )
                })
            })
            .collect();

        // Parse env vars manually and set overrides if they exist as the
        // config package `Environment` module seems to behave poorly.
        for (k, v) in env_source.iter() {
            let k = k.to_lowercase();

            if let Some(k_postfix) = possible_keys.get(&k) {
                let mut k: Vec<_> = k.split('_').filter(|x| x != &prefix).collect();
                if let Some(last) = k.last_mut() {
                    *last = k_postfix;
                }
                let k = k.join(".");

                // Filter empty values
                if v.as_str() == "" {
                    continue;
                }

                s = s.set_override(k, v.as_str())?;
            }
        }

        s.build()?.try_deserialize()
    }
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Node {
    /// The network name the node is running on. One of `mainnet`, `testnet` or `regtest`.
    #[serde(alias = "networkname")]
    pub network_name: String,

    /// Node data directory
    #[serde(alias = "datadir")]
    pub data_dir: String,

    /// If specified, we won't be storing anything to disk.
    #[serde(alias = "memoryonly")]
    pub memory_only: bool,

    /// Number of block verification threads.
    ///
    /// Default is 0 which means the number of cores of the system
    #[serde(alias = "verifierthreads")]
    pub verifier_threads: u16,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            network_name: "mainnet".to_owned(),
            data_dir: config_root().to_string_lossy().into_owned(),
            memory_only: false,
            verifier_threads: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Zerocoin {
    /// Default number of checkpoints folded into a witness beyond the
    /// window of the mint. 100 means all available history.
    #[serde(alias = "defaultsecuritylevel")]
    pub default_security_level: u16,

    /// Number of precomputed witnesses kept in memory.
    #[serde(alias = "precomputecachesize")]
    pub precompute_cache_size: u16,

    /// Number of dirty precomputed witnesses buffered before a flush.
    #[serde(alias = "precomputedirtylimit")]
    pub precompute_dirty_limit: u16,

    /// Seconds between two flushes of the precompute cache.
    #[serde(alias = "precomputeflushsecs")]
    pub precompute_flush_secs: u16,

    /// Number of deterministic mints kept ahead of the mint counter.
    #[serde(alias = "mintpoolsize")]
    pub mint_pool_size: u16,
}

impl Default for Zerocoin {
    fn default() -> Self {
        Self {
            default_security_level: 100,
            precompute_cache_size: 2000,
            precompute_dirty_limit: 1000,
            precompute_flush_secs: 900,
            mint_pool_size: 20,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FieldNamesAsArray)]
pub struct RingCt {
    /// Ring size used when building anon spends.
    #[serde(alias = "defaultringsize")]
    pub default_ring_size: u16,

    /// Extra confirmations required for decoys beyond the consensus minimum.
    /// Regtest overrides this to -1.
    #[serde(alias = "decoyextradepth")]
    pub decoy_extra_depth: i16,
}

impl Default for RingCt {
    fn default() -> Self {
        Self {
            default_ring_size: 11,
            decoy_extra_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DynamicConfVal {
    String(String),
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
}
