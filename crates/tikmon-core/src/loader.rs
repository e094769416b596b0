//! Configuration loading
//!
//! Reads the root file, collects sub configs from the module folders and
//! applies all module extensions once every module is known. Any error
//! rejects the whole load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{Configuration, RootFile, SubConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::extension::{merge, CommandExtension};

/// Load and assemble the configuration rooted at `path`
pub fn load_configuration(path: &Path) -> ConfigResult<Configuration> {
    info!(path = %path.display(), "loading configuration");

    let root: RootFile = read_yaml(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut config = Configuration {
        global: root.global,
        targets: root.content.targets,
        modules: root.content.modules,
    };
    let mut extensions: Vec<(String, Vec<CommandExtension>)> = Vec::new();

    let folders = config.global.module_folders.clone();
    for folder in &folders {
        let dir = base.join(folder);
        for file in sub_config_files(&dir)? {
            debug!(path = %file.display(), "loading sub config");
            let sub: SubConfig = read_yaml(&file)?;

            for (name, module) in sub.modules {
                if config.modules.contains_key(&name) {
                    return Err(ConfigError::DuplicateModule { name, path: file });
                }
                config.modules.insert(name, module);
            }

            for (name, target) in sub.targets {
                if config.targets.contains_key(&name) {
                    return Err(ConfigError::DuplicateTarget { name, path: file });
                }
                config.targets.insert(name, target);
            }

            extensions.extend(sorted(sub.module_extensions));
        }
    }

    extensions.extend(sorted(root.content.module_extensions));
    apply_extensions(&mut config.modules, &extensions);

    for (name, target) in &config.targets {
        for module in target.modules.iter().filter(|m| !config.modules.contains_key(*m)) {
            warn!(target = %name, module = %module, "target references unknown module");
        }
    }

    info!(
        targets = config.targets.len(),
        modules = config.modules.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Parse the root file or a sub config
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn sub_config_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    let io_error = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn sorted(
    extensions: HashMap<String, Vec<CommandExtension>>,
) -> Vec<(String, Vec<CommandExtension>)> {
    let mut list: Vec<_> = extensions.into_iter().collect();
    list.sort_by(|a, b| a.0.cmp(&b.0));
    list
}

fn apply_extensions(
    modules: &mut HashMap<String, crate::config::Module>,
    extensions: &[(String, Vec<CommandExtension>)],
) {
    for (name, patches) in extensions {
        match modules.get_mut(name) {
            Some(module) => {
                debug!(module = %name, patches = patches.len(), "applying module extension");
                *module = merge(module, patches);
            }
            None => info!(module = %name, "found extension, but this module was not found"),
        }
    }
}
