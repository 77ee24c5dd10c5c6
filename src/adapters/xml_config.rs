use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use xmltree::{Element, XMLNode};

use super::schema::{reject_dtd, validation_error, Schema};
use crate::domain::validation::clean_input;
use crate::domain::{ConfigRecord, FirmwareError, PlatformRecord};

/// Upper bound on parsing and validating a configuration document.
pub const PARSE_TIMEOUT: Duration = Duration::from_secs(5);

const PRODUCT_TAG: &str = "firmware_product";

/// Where the configuration document comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Text(String),
}

/// Schema-validated platform configuration document.
#[derive(Debug, Clone)]
pub struct XmlConfigStore {
    root: Element,
}

impl XmlConfigStore {
    /// Parse and validate `source` against the schema at `schema_path`,
    /// giving up after [`PARSE_TIMEOUT`].
    pub async fn load(source: ConfigSource, schema_path: &Path) -> Result<Self, FirmwareError> {
        Self::load_with_timeout(source, schema_path, PARSE_TIMEOUT).await
    }

    pub async fn load_with_timeout(
        source: ConfigSource,
        schema_path: &Path,
        limit: Duration,
    ) -> Result<Self, FirmwareError> {
        let schema_path = schema_path.to_path_buf();
        let root = run_bounded(limit, move || parse_and_validate(&source, &schema_path)).await?;
        Ok(Self { root })
    }

    fn products(&self) -> impl Iterator<Item = &Element> {
        self.root
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .filter(|e| e.name == PRODUCT_TAG)
    }

    /// Names of every configured platform.
    pub fn platforms(&self) -> Vec<String> {
        self.products()
            .filter_map(|p| p.attributes.get("name").cloned())
            .collect()
    }

    /// Installation directives for the platform named by `platform.product`.
    pub fn lookup(&self, platform: &PlatformRecord) -> Result<ConfigRecord, FirmwareError> {
        let name = platform.product.as_str();
        debug!(platforms = ?self.platforms(), "available platforms");

        let product = self
            .products()
            .find(|p| p.attributes.get("name").map(String::as_str) == Some(name))
            .ok_or_else(|| FirmwareError::UnsupportedPlatform(name.to_string()))?;

        let mut fields: HashMap<&str, String> = HashMap::new();
        for child in product.children.iter().filter_map(XMLNode::as_element) {
            let text = child.get_text().map(|t| t.trim().to_string()).unwrap_or_default();
            if text.is_empty() {
                return Err(FirmwareError::EmptyTag(child.name.clone()));
            }
            fields.insert(child.name.as_str(), clean_input(&text));
        }
        let mut take = |key: &str| fields.remove(key).filter(|v| !v.is_empty());

        let record = ConfigRecord {
            platform: platform.clone(),
            file_type: take("firmware_file_type"),
            tool_path: take("firmware_tool"),
            tool_args: take("firmware_tool_args"),
            tool_check_args: take("firmware_tool_check_args"),
            tool_options: take("tool_options"),
            firmware_destination: take("firmware_dest_path"),
            guid_required: product
                .attributes
                .get("guid")
                .is_some_and(|v| !v.is_empty()),
            guid: None,
        };
        info!(platform = name, "matched platform configuration");
        Ok(record)
    }
}

/// Run blocking `work` on the blocking pool, failing with
/// [`FirmwareError::ParserTimeout`] once `limit` has passed.
async fn run_bounded<T, F>(limit: Duration, work: F) -> Result<T, FirmwareError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FirmwareError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(FirmwareError::InvalidConfiguration(format!(
            "XML parser task failed: {}",
            join_error
        ))),
        Err(_) => Err(FirmwareError::ParserTimeout(limit)),
    }
}

fn check_schema_file(path: &Path) -> Result<(), FirmwareError> {
    let meta = fs::symlink_metadata(path).map_err(|_| {
        FirmwareError::InvalidConfiguration(format!(
            "Error with Schema file: File does not exist or file path is not to a file: {}",
            path.display()
        ))
    })?;
    if meta.file_type().is_symlink() {
        return Err(FirmwareError::InvalidConfiguration(format!(
            "Error with Schema file: Security error: Source file is a symlink: {}",
            path.display()
        )));
    }
    if !meta.is_file() {
        return Err(FirmwareError::InvalidConfiguration(format!(
            "Error with Schema file: File does not exist or file path is not to a file: {}",
            path.display()
        )));
    }
    Ok(())
}

fn parse_and_validate(source: &ConfigSource, schema_path: &Path) -> Result<Element, FirmwareError> {
    debug!(schema = %schema_path.display(), "validating configuration document");
    check_schema_file(schema_path)?;

    let text = match source {
        ConfigSource::File(path) => {
            if !path.exists() {
                return Err(FirmwareError::InvalidConfiguration(
                    "XML file not found".to_string(),
                ));
            }
            fs::read_to_string(path)
                .map_err(|e| FirmwareError::io(format!("reading {}", path.display()), e))?
        }
        ConfigSource::Text(text) => text.clone(),
    };
    reject_dtd(&text)?;
    let doc = Element::parse(text.as_bytes()).map_err(validation_error)?;

    let schema_text = fs::read_to_string(schema_path)
        .map_err(|e| FirmwareError::io(format!("reading {}", schema_path.display()), e))?;
    Schema::parse(&schema_text)?.validate(&doc)?;
    Ok(doc)
}
