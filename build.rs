use std::env;
use std::fs;
use std::path::Path;

// Variables que lee `ResilienceConfig::from_env`
const KNOWN_KEYS: &[&str] = &[
    "DRAFT_DEBOUNCE_MS",
    "PENDING_MAX_RETRIES",
    "QUEUE_STORAGE_KEY",
    "DRAFT_KEY_PREFIX",
    "QUEUE_ORDERING",
    "ENABLE_LOGGING",
];

const NUMERIC_KEYS: &[&str] = &["DRAFT_DEBOUNCE_MS", "PENDING_MAX_RETRIES"];

fn main() {
    for key in KNOWN_KEYS {
        println!("cargo:rerun-if-env-changed={}", key);
    }
    println!("cargo:rerun-if-changed=build.rs");

    let env_file = Path::new(".env");
    if !env_file.exists() {
        return;
    }
    println!("cargo:rerun-if-changed=.env");

    let contents = match fs::read_to_string(env_file) {
        Ok(contents) => contents,
        Err(e) => {
            println!("cargo:warning=No se pudo leer .env: {}", e);
            return;
        }
    };

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            println!("cargo:warning=.env:{}: se esperaba KEY=VALUE", number + 1);
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');

        if !KNOWN_KEYS.contains(&key) {
            continue;
        }
        if NUMERIC_KEYS.contains(&key) && value.parse::<u32>().is_err() {
            println!("cargo:warning=.env: {}={} no es un número, se ignora", key, value);
            continue;
        }

        // Lo definido en el entorno tiene prioridad
        if env::var(key).is_err() {
            println!("cargo:rustc-env={}={}", key, value);
        }
    }
}
