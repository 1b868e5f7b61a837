//! Post-apply TCP and HTTP probes.
//!
//! Addresses and URLs may reference output values as `${{ .name }}`; the
//! values come from the resource's output secret.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use strata_core::resource::{HealthCheck, HealthCheckKind};
use strata_core::{ManagedResource, reason};
use strata_engine::protocol::GetOutputsRequest;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const TEMPLATE_PATTERN: &str = r"\$\{\{\s*\.?([A-Za-z0-9_\-]+)\s*\}\}";

static TEMPLATE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(TEMPLATE_PATTERN));

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("error getting outputs for health checks: {0}")]
    Template(String),

    #[error("invalid address for tcp health check: {address}, {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid url for http health check: {url}, {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to perform tcp health check for {name} on {address}: {reason}")]
    Tcp {
        name: String,
        address: String,
        reason: String,
    },

    #[error("failed to perform http health check for {name} on {url}: {reason}")]
    Http {
        name: String,
        url: String,
        reason: String,
    },
}

/// Substitute `${{ .key }}` references. A key missing from `values` is an
/// error rather than an empty string.
pub fn render_template(
    text: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, HealthCheckError> {
    let pattern = TEMPLATE
        .as_ref()
        .map_err(|e| HealthCheckError::Template(e.to_string()))?;
    let mut missing = None;
    let rendered = pattern.replace_all(text, |caps: &Captures<'_>| {
        let key = &caps[1];
        match values.get(key) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(HealthCheckError::Template(format!(
            "map has no entry for key {key:?}"
        ))),
        None => Ok(rendered.into_owned()),
    }
}

/// `host:port` with no scheme, a port in 1..=65535 and a host that is an IP
/// address or a valid RFC 952 host name.
pub fn validate_tcp_address(address: &str) -> Result<(), HealthCheckError> {
    let invalid = |reason: &str| HealthCheckError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    if address.contains("://") {
        return Err(invalid("URL schemas are not allowed"));
    }
    let (host, port) = split_host_port(address).map_err(invalid)?;

    if host.parse::<IpAddr>().is_err() && !host.split('.').all(is_valid_label) {
        return Err(invalid("invalid host format"));
    }
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(()),
        _ => Err(invalid("invalid port number")),
    }
}

fn split_host_port(address: &str) -> Result<(&str, &str), &'static str> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or("missing ']' in address")?;
        let port = tail.strip_prefix(':').ok_or("missing port in address")?;
        return Ok((host, port));
    }
    let (host, port) = address.rsplit_once(':').ok_or("missing port in address")?;
    if host.contains(':') {
        return Err("too many colons in address");
    }
    Ok((host, port))
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_alphanumeric() || c == '-')
}

pub async fn tcp_probe(name: &str, address: &str, timeout: Duration) -> Result<(), HealthCheckError> {
    validate_tcp_address(address)?;
    let failed = |reason: String| HealthCheckError::Tcp {
        name: name.to_string(),
        address: address.to_string(),
        reason,
    };
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(failed(e.to_string())),
        Err(_) => Err(failed(format!("timed out after {timeout:?}"))),
    }
}

/// GET `raw_url`; any 2xx or 3xx status passes.
pub async fn http_probe(name: &str, raw_url: &str, timeout: Duration) -> Result<(), HealthCheckError> {
    let parsed = url::Url::parse(raw_url).map_err(|e| HealthCheckError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;
    let failed = |reason: String| HealthCheckError::Http {
        name: name.to_string(),
        url: raw_url.to_string(),
        reason,
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let mut response = agent.get(parsed.as_str()).call().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        if (200..400).contains(&status) {
            return Ok(());
        }
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(format!("status {status}, response body: {body}"))
    })
    .await
    .map_err(|e| failed(format!("probe aborted: {e}")))?;

    outcome.map_err(failed)
}

impl Reconciler {
    /// Run every configured probe in order. The first failure stops the rest.
    pub(crate) async fn run_health_checks(
        &self,
        resource: &mut ManagedResource,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        tracing::info!(resource = %key, checks = resource.spec.health_checks.len(), "running health checks");

        let mut values = BTreeMap::new();
        if let Some(target) = &resource.spec.write_outputs_to_secret {
            if !target.name.is_empty() {
                let request = GetOutputsRequest {
                    namespace: resource.namespace().to_string(),
                    secret_name: target.name.clone(),
                };
                match self.engine.get_outputs(request).await {
                    Ok(reply) => values = reply.outputs,
                    Err(e) => {
                        let msg = HealthCheckError::Template(e.to_string()).to_string();
                        resource.mark_health_check_failed(&msg);
                        return Err(ControllerError::Phase(msg));
                    }
                }
            }
        }

        let checks = resource.spec.health_checks.clone();
        for check in &checks {
            if let Err(e) = run_check(check, &values).await {
                let target = match check.kind {
                    HealthCheckKind::Tcp => &check.address,
                    HealthCheckKind::Http => &check.url,
                };
                tracing::warn!(resource = %key, check = %check.name, error = %e, "health check failed");
                if !matches!(e, HealthCheckError::Template(_)) {
                    let msg = format!("{} health check error: {}, url: {target}", check.kind, check.name);
                    self.event(resource, Severity::Error, reason::HEALTH_CHECKS_FAILED, msg, revision)
                        .await;
                }
                let msg = e.to_string();
                resource.mark_health_check_failed(&msg);
                return Err(ControllerError::Phase(msg));
            }
        }

        tracing::info!(resource = %key, "health checks succeeded");
        self.event(resource, Severity::Info, reason::HEALTH_CHECKS_SUCCEEDED, "Health checks succeeded", revision)
            .await;
        resource.mark_health_check_succeeded("Health checks succeeded");
        Ok(())
    }
}

async fn run_check(
    check: &HealthCheck,
    values: &BTreeMap<String, String>,
) -> Result<(), HealthCheckError> {
    let timeout = check
        .timeout
        .map(|t| t.unsigned_abs())
        .filter(|t| !t.is_zero())
        .unwrap_or(DEFAULT_TIMEOUT);
    match check.kind {
        HealthCheckKind::Tcp => {
            let address = render_template(&check.address, values)?;
            tcp_probe(&check.name, &address, timeout).await
        }
        HealthCheckKind::Http => {
            let url = render_template(&check.url, values)?;
            http_probe(&check.name, &url, timeout).await
        }
    }
}
