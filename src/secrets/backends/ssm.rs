//! AWS Systems Manager parameters, driven through the `aws` CLI.
//!
//! `ssm:///<parameter name>[?region=<region>]` or a parameter ARN
//! `arn:<partition>:ssm:<region>:<account>:parameter/<name>`.

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::errors::{Error, Result};
use crate::secrets::exec::CommandRunner;
use crate::secrets::factory::ReferenceContext;
use crate::secrets::reference::SecretReference;
use crate::secrets::types::SecretString;

const PROGRAM: &str = "aws";
const REGION_PARAM: &str = "region";

static PARAMETER_ARN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]*):ssm:([^:]*):([^:]*):parameter/(.+)$").unwrap());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterOutput {
    parameter: Parameter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    value: String,
}

#[derive(Debug)]
pub struct ParameterReference {
    /// Parameter name with a leading `/`, or the full ARN
    name: String,
    region: Option<String>,
    commands: Arc<dyn CommandRunner>,
}

impl fmt::Display for ParameterReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_arn() {
            return f.write_str(&self.name);
        }
        write!(f, "ssm://{}", self.name)?;
        if let Some(region) = &self.region {
            write!(f, "?{}={}", REGION_PARAM, region)?;
        }
        Ok(())
    }
}

pub fn from_url(url: &Url, context: &ReferenceContext) -> Result<Arc<dyn SecretReference>> {
    Ok(Arc::new(ParameterReference::parse(url, Arc::clone(&context.commands))?))
}

impl ParameterReference {
    pub fn parse(url: &Url, commands: Arc<dyn CommandRunner>) -> Result<Self> {
        match url.scheme() {
            "arn" => {
                // ARNs of other services (IAM roles and the like) are common
                // in the environment and are not secret references.
                let service = url.path().split(':').nth(1).unwrap_or_default();
                if service != "ssm" {
                    return Err(Error::UnsupportedScheme(format!("arn:{}", service)));
                }
                let captures = PARAMETER_ARN_REGEX.captures(url.path()).ok_or_else(|| {
                    Error::invalid_reference("arn", format!("{} is not an SSM parameter ARN", url))
                })?;
                let region = Some(captures[2].to_string()).filter(|r| !r.is_empty());
                Ok(Self { name: url.as_str().to_string(), region, commands })
            }
            "ssm" => {
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(Error::invalid_reference(
                        "ssm",
                        "expected ssm:///<parameter name>, the host must be empty",
                    ));
                }
                let name = urlencoding::decode(url.path())
                    .map_err(|_| Error::invalid_reference("ssm", "parameter name is not valid UTF-8"))?
                    .into_owned();
                if name.trim_matches('/').is_empty() {
                    return Err(Error::invalid_reference("ssm", "a parameter name is required"));
                }
                let name = if name.starts_with('/') { name } else { format!("/{}", name) };

                let mut region = None;
                for (key, value) in url.query_pairs() {
                    if key != REGION_PARAM {
                        return Err(Error::invalid_reference(
                            "ssm",
                            format!("unsupported query parameter '{}'", key),
                        ));
                    }
                    region = Some(value.into_owned()).filter(|r| !r.is_empty());
                }
                Ok(Self { name, region, commands })
            }
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }

    fn is_arn(&self) -> bool {
        self.name.starts_with("arn:")
    }

    fn args(&self, operation: &str) -> Vec<String> {
        let mut args = vec![
            "ssm".to_string(),
            operation.to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }
}

#[async_trait]
impl SecretReference for ParameterReference {
    async fn read(&self) -> Result<SecretString> {
        let mut args = self.args("get-parameter");
        args.push("--with-decryption".to_string());
        let output = self.commands.run(PROGRAM, &args).await?;
        let parsed: GetParameterOutput = serde_json::from_str(&output)?;
        debug!(reference = %self, "Read SSM parameter");
        Ok(SecretString::new(parsed.parameter.value))
    }

    async fn update(&self, value: &SecretString, _expires_on: NaiveDate) -> Result<()> {
        let mut args = self.args("put-parameter");
        args.push("--value".to_string());
        args.push(value.expose_secret().to_string());
        args.push("--type".to_string());
        args.push("SecureString".to_string());
        args.push("--overwrite".to_string());
        self.commands.run(PROGRAM, &args).await?;
        debug!(reference = %self, "Updated SSM parameter");
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        if self.is_arn() {
            "arn"
        } else {
            "ssm"
        }
    }
}
