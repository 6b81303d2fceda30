//! # PMOConfig - configuration YAML de la pile UPnP
//!
//! Ce crate gère la configuration de la pile :
//! - chargement depuis un fichier `config.yaml`
//! - fusion avec la configuration par défaut embarquée
//! - surcharge par variables d'environnement
//! - accesseurs typés
//!
//! Il n'existe pas d'instance globale : la racine de composition charge un
//! [`Config`] et le transmet explicitement (`Arc<Config>`) aux composants.
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let level = config.get_log_min_level()?;
//! config.set_log_enable_console(false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Surcharges par l'environnement
//!
//! `PMOUPNP_CONFIG__UPNP__STREAM__HTTP_PORT=8200` remplace `upnp.stream.http_port`.
//! Les valeurs sont interprétées comme du YAML (`true`, `42`, `"texte"`).

use anyhow::{Result, anyhow};
use dirs::home_dir;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Number, Value};
use std::{env, fs, path::Path};
use tracing::{debug, info};
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmoupnp.yaml");

const ENV_CONFIG_DIR: &str = "PMOUPNP_CONFIG";
const ENV_PREFIX: &str = "PMOUPNP_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmoupnp";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Génère un getter/setter pour une valeur booléenne avec défaut
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Gestionnaire de configuration.
///
/// Les données sont un arbre `serde_yaml::Value` protégé par un mutex ;
/// chaque `set_value` persiste immédiatement le fichier si la configuration
/// est adossée à un répertoire.
#[derive(Debug)]
pub struct Config {
    config_dir: Option<String>,
    path: Option<String>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    /// Cherche le répertoire de configuration, dans l'ordre :
    /// 1. le paramètre `directory` s'il est non vide
    /// 2. la variable d'environnement `PMOUPNP_CONFIG`
    /// 3. `.pmoupnp` dans le répertoire courant
    /// 4. `.pmoupnp` dans le répertoire de l'utilisateur
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Crée le répertoire si besoin et vérifie qu'il est lisible et inscriptible
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Détermine et valide le répertoire de configuration.
    pub fn resolve_config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Charge la configuration depuis un répertoire.
    ///
    /// 1. Détermine le répertoire de configuration
    /// 2. Charge la configuration embarquée
    /// 3. Fusionne `config.yaml` s'il existe
    /// 4. Applique les surcharges d'environnement
    /// 5. Sauvegarde la configuration fusionnée
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::resolve_config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join(CONFIG_FILE_NAME)
            .to_string_lossy()
            .to_string();

        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut value, &external);
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let mut value = lower_keys_value(value);
        apply_env_overrides(&mut value);

        let config = Config {
            config_dir: Some(config_dir),
            path: Some(path),
            data: Mutex::new(value),
        };

        config.save()?;
        Ok(config)
    }

    /// Construit une configuration en mémoire, jamais persistée.
    ///
    /// Le YAML fourni est fusionné avec la configuration embarquée ; les
    /// surcharges d'environnement ne sont pas appliquées.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if !yaml.trim().is_empty() {
            let external: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut value, &external);
        }

        Ok(Config {
            config_dir: None,
            path: None,
            data: Mutex::new(lower_keys_value(value)),
        })
    }

    /// Configuration embarquée seule, en mémoire.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml_str("")
    }

    /// Répertoire de configuration, `None` pour une configuration en mémoire
    pub fn config_dir(&self) -> Option<&str> {
        self.config_dir.as_deref()
    }

    /// Sauvegarde la configuration dans `config.yaml`.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = {
            let data = self.data.lock();
            serde_yaml::to_string(&*data)?
        };
        fs::write(path, yaml)?;
        debug!(config_file = %path, "Configuration saved");
        Ok(())
    }

    /// Définit une valeur et sauvegarde.
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin des clés (ex: `&["upnp", "stream", "http_port"]`)
    /// * `value` - Valeur YAML
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock();
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Récupère une valeur ; erreur si le chemin n'existe pas.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        get_value_internal(&data, path)
    }

    /// Récupère une chaîne non vide, ou la valeur par défaut.
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    /// Récupère l'UDN d'un device, en le générant s'il n'existe pas.
    ///
    /// Le préfixe `uuid:` est retiré ; l'UDN généré est persisté pour que
    /// le device garde la même identité d'un démarrage à l'autre.
    pub fn get_device_udn(&self, devtype: &str, name: &str) -> Result<String> {
        let path = &["devices", devtype, name, "udn"];
        match self.get_value(path) {
            Ok(Value::String(udn)) if !udn.trim().is_empty() => {
                let udn = udn.trim();
                Ok(udn.strip_prefix("uuid:").unwrap_or(udn).to_string())
            }
            _ => {
                let new_udn = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_udn.clone()))?;
                info!(devtype, name, udn = %new_udn, "Generated new device UDN");
                Ok(new_udn)
            }
        }
    }

    /// Définit l'UDN d'un device
    pub fn set_device_udn(&self, devtype: &str, name: &str, udn: String) -> Result<()> {
        let udn = udn.trim();
        let sanitized = udn.strip_prefix("uuid:").unwrap_or(udn).to_string();
        self.set_value(&["devices", devtype, name, "udn"], Value::String(sanitized))
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["log", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Niveau de log minimum (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`)
    pub fn get_log_min_level(&self) -> Result<String> {
        Ok(self.get_string_or(&["log", "min_level"], DEFAULT_LOG_MIN_LEVEL))
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["log", "min_level"], Value::String(level))
    }

    /// Définit un entier non signé (helper pour les extensions)
    pub fn set_u64(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Null = data {
        *data = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            match map.get(&Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if set_value_internal(config, &key_path, yaml_value).is_ok() {
                debug!(key = %key, "Applied environment override");
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Fusionne récursivement `external` dans `default`.
///
/// Les mappings sont fusionnés clé par clé, les scalaires et séquences sont remplacés.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
