//! Run resource client: typed access to one run on the orchestration server.
//!
//! URLs are built as `{endpoint}/run/{diid}[/{key}]`. Values travel as
//! `text/plain` and are quote-stripped on read; the full run representation
//! is fetched as XML once and cached until [`RunClient::discard`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info};

use super::document::{RunDocument, Target};
use super::keys;
use super::node::{NodeInstance, ScaleState};
use crate::config::{Config, ConfigTrait};
use crate::error::{AgentError, Result};
use crate::http::client::CallOptions;
use crate::http::Transport;

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_XML: &str = "application/xml";

pub struct RunClient {
    transport: Arc<Transport>,
    endpoint: String,
    diid: String,
    node_instance: String,
    username: Option<String>,
    ignore_abort: bool,
    run_url: String,
    report_url: String,
    document: Mutex<Option<Arc<RunDocument>>>,
    ansi: Regex,
}

impl RunClient {
    pub fn new(
        transport: Arc<Transport>,
        endpoint: &str,
        diid: &str,
        node_instance: &str,
        username: Option<String>,
        ignore_abort: bool,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let ansi = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]")
            .map_err(|e| AgentError::Internal(format!("ansi pattern: {e}")))?;
        Ok(Self {
            run_url: format!("{endpoint}{}/{diid}", keys::RUN_RESOURCE_PATH),
            report_url: format!("{endpoint}{}/{diid}", keys::REPORTS_RESOURCE_PATH),
            transport,
            endpoint,
            diid: diid.to_string(),
            node_instance: node_instance.to_string(),
            username,
            ignore_abort,
            document: Mutex::new(None),
            ansi,
        })
    }

    pub fn from_cfg(cfg: &Config, transport: Arc<Transport>) -> Result<Self> {
        Self::new(
            transport,
            &cfg.server().endpoint,
            &cfg.run().diid,
            &cfg.run().node_instance,
            cfg.server().username.clone(),
            cfg.run().ignore_abort,
        )
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn diid(&self) -> &str {
        &self.diid
    }

    /// Name of the node instance this agent drives, e.g. `apache.1`.
    pub fn node_instance_name(&self) -> &str {
        &self.node_instance
    }

    /// Node name without multiplicity.
    pub fn node_name(&self) -> &str {
        keys::base_node_name(&self.node_instance)
    }

    fn key_url(&self, key: &str, ignore_abort: bool) -> String {
        let mut url = format!("{}/{key}", self.run_url);
        if self.ignore_abort || ignore_abort {
            url.push_str(keys::IGNORE_ABORT_QUERY);
        }
        url
    }

    fn text_call() -> CallOptions<'static> {
        CallOptions {
            content_type: Some(TEXT_PLAIN),
            accept: Some(TEXT_PLAIN),
            retry: true,
        }
    }

    /// Reads a runtime parameter.
    pub async fn get_parameter(&self, key: &str, ignore_abort: bool) -> Result<String> {
        let url = self.key_url(key, ignore_abort);
        match self.transport.get(&url, Self::text_call()).await {
            Ok((_, body)) => Ok(strip_quotes(&body)),
            Err(AgentError::NotFound(reason)) => Err(AgentError::NotFound(format!("\"{reason}\" for {key}"))),
            Err(e) => Err(e),
        }
    }

    /// Writes a runtime parameter and returns the value echoed by the server.
    pub async fn set_parameter(&self, key: &str, value: &str, ignore_abort: bool) -> Result<String> {
        let url = self.key_url(key, ignore_abort);
        let body = self.ansi.replace_all(value, "").into_owned();
        let (_, echoed) = self
            .transport
            .put(&url, Some(Bytes::from(body)), Self::text_call())
            .await?;
        Ok(strip_quotes(&echoed))
    }

    /// Abort message of the run, empty when not aborted. Readable while aborted.
    pub async fn get_abort_message(&self) -> Result<String> {
        self.get_parameter(&keys::global(keys::ABORT_KEY), true).await
    }

    pub async fn is_abort(&self) -> Result<bool> {
        Ok(!self.get_abort_message().await?.is_empty())
    }

    /// Raises the run abort flag with `message`.
    pub async fn fail(&self, message: &str) -> Result<()> {
        self.set_parameter(&keys::global(keys::ABORT_KEY), message, false)
            .await
            .map(|_| ())
    }

    /// Current global lifecycle state name.
    pub async fn get_state(&self) -> Result<String> {
        self.get_parameter(&keys::global(keys::STATE_KEY), true).await
    }

    /// Full run representation, fetched once and then served from cache.
    pub async fn get_run_document(&self) -> Result<Arc<RunDocument>> {
        if let Some(doc) = self.document.lock().as_ref() {
            return Ok(doc.clone());
        }
        let opts = CallOptions {
            content_type: None,
            accept: Some(APPLICATION_XML),
            retry: true,
        };
        let (_, body) = self.transport.get(&self.run_url, opts).await?;
        let doc = Arc::new(RunDocument::parse(&body)?);
        *self.document.lock() = Some(doc.clone());
        Ok(doc)
    }

    /// Forgets the cached run document.
    pub fn discard(&self) {
        self.document.lock().take();
    }

    /// Uploads a local file to `{endpoint}/reports/{diid}/{basename}`.
    pub async fn upload_report(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AgentError::Internal(format!("report path has no file name: {path:?}")))?;
        let url = format!("{}/{name}", self.report_url);
        info!(component = "run", event = "report_upload", url = %url, "uploading report");

        let body = tokio::fs::read(path).await?;
        let opts = CallOptions {
            content_type: None,
            accept: Some("*/*"),
            retry: true,
        };
        self.transport.put(&url, Some(Bytes::from(body)), opts).await?;
        Ok(())
    }

    /// Tells the server this node completed its current state.
    ///
    /// The server moves the run forward once every node completed; callers
    /// poll [`RunClient::get_state`] to observe the new state.
    pub async fn advance_state(&self) -> Result<()> {
        let url = format!(
            "{}/{}{}",
            self.run_url,
            keys::node(&self.node_instance, keys::COMPLETE_KEY),
            keys::IGNORE_ABORT_QUERY
        );
        debug!(component = "run", event = "advance", node = %self.node_instance, "completing state");
        self.transport
            .post(&url, Some(Bytes::from_static(b"reset")), Self::text_call())
            .await?;
        Ok(())
    }

    pub async fn terminate_run(&self) -> Result<()> {
        let opts = CallOptions {
            content_type: None,
            accept: None,
            retry: true,
        };
        self.transport.delete(&self.run_url, None, opts).await?;
        Ok(())
    }

    pub async fn get_run_type(&self) -> Result<String> {
        Ok(self.get_run_document().await?.run_type.clone())
    }

    /// Records a freshly built image id at `{endpoint}/{resource_uri}/{cloud}`.
    pub async fn put_new_image_id(&self, resource_uri: &str, cloud: &str, image_id: &str) -> Result<()> {
        let url = format!("{}/{}/{cloud}", self.endpoint, resource_uri.trim_matches('/'));
        info!(component = "run", event = "image_id", url = %url, image = %image_id, "Set new image id");
        self.transport
            .put(&url, Some(Bytes::from(image_id.to_string())), Self::text_call())
            .await?;
        Ok(())
    }

    pub async fn get_run_category(&self) -> Result<String> {
        Ok(self.get_run_document().await?.category.clone())
    }

    pub async fn get_run_parameters(&self) -> Result<BTreeMap<String, Option<String>>> {
        Ok(self.get_run_document().await?.parameters.clone())
    }

    pub async fn get_node_instances(&self, cloud_filter: Option<&str>) -> Result<BTreeMap<String, NodeInstance>> {
        self.get_run_document().await?.node_instances(cloud_filter)
    }

    /// Node instances currently in `state`, optionally on one cloud only.
    pub async fn get_node_instances_in_scale_state(
        &self,
        state: ScaleState,
        cloud_filter: Option<&str>,
    ) -> Result<BTreeMap<String, NodeInstance>> {
        let mut instances = self.get_node_instances(cloud_filter).await?;
        instances.retain(|_, ni| ni.scale_state() == Some(state));
        Ok(instances)
    }

    /// Deployment targets of `node_name`.
    pub async fn get_targets(&self, node_name: &str) -> Result<BTreeMap<String, Target>> {
        Ok(self.get_run_document().await?.targets(node_name))
    }

    /// Scale state of this agent's node instance, `None` while unset.
    pub async fn get_scale_state(&self) -> Result<Option<ScaleState>> {
        let key = keys::node(&self.node_instance, keys::SCALE_STATE_KEY);
        let value = match self.get_parameter(&key, false).await {
            Ok(value) => value,
            Err(AgentError::NotYetSet(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if value.is_empty() {
            return Ok(None);
        }
        value.parse().map(Some)
    }

    pub async fn set_scale_state(&self, state: ScaleState) -> Result<()> {
        self.set_scale_state_on(&self.node_instance, state).await
    }

    pub async fn set_scale_state_on(&self, instance: &str, state: ScaleState) -> Result<()> {
        let key = keys::node(instance, keys::SCALE_STATE_KEY);
        self.set_parameter(&key, state.as_str(), false).await.map(|_| ())
    }

    /// Reads a parameter from the user resource, e.g. `General.ssh.public.key`.
    pub async fn get_user_parameter(&self, name: &str) -> Result<Option<String>> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| AgentError::Config("server.username is required to read user parameters".into()))?;
        let url = format!("{}{}/{username}", self.endpoint, keys::USER_RESOURCE_PATH);
        let opts = CallOptions {
            content_type: None,
            accept: Some(APPLICATION_XML),
            retry: true,
        };
        let (_, body) = self.transport.get(&url, opts).await?;
        user_parameter(&body, name)
    }
}

/// Trims whitespace then surrounding quotes, as the server may quote values.
pub fn strip_quotes(value: &str) -> String {
    value.trim().trim_matches('"').trim_matches('\'').to_string()
}

fn user_parameter(xml: &str, name: &str) -> Result<Option<String>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| AgentError::Document(format!("user document: {e}")))?;
    let value = doc
        .descendants()
        .filter(|n| n.has_tag_name("parameter") && n.attribute("name") == Some(name))
        .find_map(|p| {
            p.children()
                .find(|c| c.has_tag_name("value"))
                .map(|v| v.text().unwrap_or_default().to_string())
        });
    Ok(value)
}
