//! Program to container image mapping

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{Error, Result};

/// Image and in-image entrypoint for one program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub image: String,
    pub binary: String,
}

static DEFAULT_IMAGES: Lazy<BTreeMap<&'static str, (&'static str, &'static str)>> =
    Lazy::new(|| {
        BTreeMap::from([
            ("actionlint", ("rhysd/actionlint:latest", "actionlint")),
            ("conftest", ("openpolicyagent/conftest:latest", "conftest")),
            ("grype", ("anchore/grype:latest", "/grype")),
            ("helm", ("alpine/helm:latest", "helm")),
            ("kube-bench", ("aquasec/kube-bench:latest", "kube-bench")),
            ("kubectl", ("bitnami/kubectl:latest", "kubectl")),
            ("oscap", ("cloudshipai/openscap:latest", "oscap")),
            ("syft", ("anchore/syft:latest", "/syft")),
            ("trivy", ("aquasec/trivy:latest", "trivy")),
        ])
    });

/// Resolves the program in `argv[0]` to the image that ships it
#[derive(Debug, Clone)]
pub struct ImageTable {
    entries: BTreeMap<String, ImageSpec>,
}

impl Default for ImageTable {
    fn default() -> Self {
        let entries = DEFAULT_IMAGES
            .iter()
            .map(|(program, (image, binary))| {
                (
                    (*program).to_string(),
                    ImageSpec {
                        image: (*image).to_string(),
                        binary: (*binary).to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

impl ImageTable {
    /// Replace images for the given programs. Unknown programs are added with
    /// the program name as entrypoint.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (program, image) in overrides {
            self.set_image(program, image);
        }
        self
    }

    /// Apply `SHIPDECK_IMAGE_<PROGRAM>` overrides for known programs
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let programs: Vec<String> = self.entries.keys().cloned().collect();
        for program in programs {
            if let Some(image) = lookup(&Self::env_key(&program)).filter(|i| !i.is_empty()) {
                self.set_image(&program, &image);
            }
        }
        self
    }

    fn set_image(&mut self, program: &str, image: &str) {
        debug!("Image override: {} -> {}", program, image);
        self.entries
            .entry(program.to_string())
            .and_modify(|spec| spec.image = image.to_string())
            .or_insert_with(|| ImageSpec {
                image: image.to_string(),
                binary: program.to_string(),
            });
    }

    /// Environment variable consulted for a program's image
    pub fn env_key(program: &str) -> String {
        format!(
            "SHIPDECK_IMAGE_{}",
            program.replace('-', "_").to_uppercase()
        )
    }

    pub fn resolve(&self, program: &str) -> Result<&ImageSpec> {
        self.entries.get(program).ok_or_else(|| {
            Error::Dispatch(format!(
                "no container image configured for '{program}' (add it under [images])"
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ImageSpec)> {
        self.entries.iter()
    }
}
