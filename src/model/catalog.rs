use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;

/// Descriptor feature an optional component backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Formula,
    Table,
}

/// One model artifact the parsing engine expects in the store.
///
/// The canonical location is `top_dir/nested_dir/marker`. Upstream snapshots
/// sometimes ship the files flat as `top_dir/marker`; the reconciler moves
/// them down one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub top_dir: &'static str,
    pub nested_dir: &'static str,
    /// Weight file, or the representative file of a directory-style artifact.
    pub marker: &'static str,
    pub required: bool,
    pub min_size_bytes: Option<u64>,
    pub feature: Option<Feature>,
}

impl ComponentSpec {
    pub fn canonical_relative_path(&self) -> PathBuf {
        self.artifact_dir().join(self.marker)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        PathBuf::from(self.top_dir).join(self.nested_dir)
    }

    pub fn flat_marker_path(&self) -> PathBuf {
        PathBuf::from(self.top_dir).join(self.marker)
    }

    /// Registry path pattern covering everything under this component's top directory.
    pub fn fetch_pattern(&self, snapshot_subdir: Option<&str>) -> String {
        match snapshot_subdir {
            Some(subdir) => format!("{}/{}/**", subdir.trim_end_matches('/'), self.top_dir),
            None => format!("{}/**", self.top_dir),
        }
    }
}

/// Alternate name that should resolve to a component's artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSpec {
    /// Store-relative path a consumer may probe.
    pub alias: &'static str,
    /// Name of the target [`ComponentSpec`].
    pub target: &'static str,
}

/// Declarative table of components and aliases driving a provisioning run.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub components: Vec<ComponentSpec>,
    pub aliases: Vec<AliasSpec>,
}

pub const PDF_EXTRACT_KIT_COMPONENTS: &[ComponentSpec] = &[
    ComponentSpec {
        name: "layout",
        top_dir: "Layout",
        nested_dir: "LayoutLMv3",
        marker: "model_final.pth",
        required: true,
        min_size_bytes: Some(100 * MIB),
        feature: None,
    },
    ComponentSpec {
        name: "formula_detection",
        top_dir: "MFD",
        nested_dir: "YOLO",
        marker: "yolo_v8_ft.pt",
        required: true,
        min_size_bytes: Some(10 * MIB),
        feature: None,
    },
    ComponentSpec {
        name: "ocr",
        top_dir: "OCR",
        nested_dir: "paddleocr",
        marker: "ch_PP-OCRv4_det_infer.onnx",
        required: true,
        min_size_bytes: Some(MIB),
        feature: None,
    },
    ComponentSpec {
        name: "formula_recognition",
        top_dir: "MFR",
        nested_dir: "unimernet_small",
        marker: "pytorch_model.pth",
        required: false,
        min_size_bytes: Some(50 * MIB),
        feature: Some(Feature::Formula),
    },
    ComponentSpec {
        name: "table_recognition",
        top_dir: "TabRec",
        nested_dir: "TableMaster",
        marker: "inference.pdiparams",
        required: false,
        min_size_bytes: Some(10 * MIB),
        feature: Some(Feature::Table),
    },
];

pub const PDF_EXTRACT_KIT_ALIASES: &[AliasSpec] = &[
    AliasSpec {
        alias: "MFR/UniMERNet",
        target: "formula_recognition",
    },
    AliasSpec {
        alias: "MFR/unimernet_small_2501",
        target: "formula_recognition",
    },
];

impl Default for Catalog {
    fn default() -> Self {
        Self {
            components: PDF_EXTRACT_KIT_COMPONENTS.to_vec(),
            aliases: PDF_EXTRACT_KIT_ALIASES.to_vec(),
        }
    }
}

impl Catalog {
    pub fn new(components: Vec<ComponentSpec>, aliases: Vec<AliasSpec>) -> Result<Self> {
        let catalog = Self {
            components,
            aliases,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Components a run must provision: every required one plus optional
    /// ones whose feature is switched on.
    pub fn wanted<'a>(
        &'a self,
        is_enabled: impl Fn(Feature) -> bool + 'a,
    ) -> impl Iterator<Item = &'a ComponentSpec> + 'a {
        self.components
            .iter()
            .filter(move |c| c.required || c.feature.is_some_and(&is_enabled))
    }

    /// Checks the alias table: targets name components, alias paths are unique
    /// and never shadow a component's artifact directory.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for component in &self.components {
            if !names.insert(component.name) {
                return Err(Error::ConfigError(format!(
                    "Duplicate component name '{}'",
                    component.name
                )));
            }
        }

        let artifact_dirs: HashSet<PathBuf> =
            self.components.iter().map(|c| c.artifact_dir()).collect();
        let mut alias_paths = HashSet::new();

        for alias in &self.aliases {
            if self.component(alias.target).is_none() {
                return Err(Error::ConfigError(format!(
                    "Alias '{}' targets '{}', which is not a component",
                    alias.alias, alias.target
                )));
            }
            let path = PathBuf::from(alias.alias);
            if artifact_dirs.contains(&path) {
                return Err(Error::ConfigError(format!(
                    "Alias '{}' collides with a component directory",
                    alias.alias
                )));
            }
            if !alias_paths.insert(path) {
                return Err(Error::ConfigError(format!(
                    "Duplicate alias '{}'",
                    alias.alias
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = Catalog::default();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.components.len(), 5);
        assert!(catalog.component("layout").unwrap().required);
        assert!(!catalog.component("formula_recognition").unwrap().required);
    }

    #[test]
    fn test_component_paths() {
        let layout = Catalog::default().component("layout").cloned().unwrap();
        assert_eq!(
            layout.canonical_relative_path(),
            PathBuf::from("Layout/LayoutLMv3/model_final.pth")
        );
        assert_eq!(layout.flat_marker_path(), PathBuf::from("Layout/model_final.pth"));
        assert_eq!(layout.fetch_pattern(Some("models")), "models/Layout/**");
        assert_eq!(layout.fetch_pattern(None), "Layout/**");
    }

    #[test]
    fn test_wanted_respects_features() {
        let catalog = Catalog::default();

        let names: Vec<&str> = catalog.wanted(|f| f == Feature::Formula).map(|c| c.name).collect();
        assert!(names.contains(&"formula_recognition"));
        assert!(!names.contains(&"table_recognition"));

        let names: Vec<&str> = catalog.wanted(|_| false).map(|c| c.name).collect();
        assert_eq!(names, vec!["layout", "formula_detection", "ocr"]);
    }

    #[test]
    fn test_alias_to_unknown_target_rejected() {
        let result = Catalog::new(
            PDF_EXTRACT_KIT_COMPONENTS.to_vec(),
            vec![AliasSpec {
                alias: "MFR/Other",
                target: "MFR/UniMERNet",
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_alias_shadowing_component_rejected() {
        let result = Catalog::new(
            PDF_EXTRACT_KIT_COMPONENTS.to_vec(),
            vec![AliasSpec {
                alias: "MFR/unimernet_small",
                target: "formula_recognition",
            }],
        );
        assert!(result.is_err());
    }
}
