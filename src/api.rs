// API client module: a small blocking HTTP client for the TensorFlow
// Deploy management service.
//
// - `Service` knows where the service lives (host/port) and covers the calls
//   that do not depend on an identity: liveness and listings.
// - `Cursor` binds a `Service` to a team/project/name/label identity and
//   exposes one method per remote operation.
//
// Every operation returns `Result<Outcome<T>>`. The outer `Error` means the
// caller misused the API or the transport broke; the inner `Failure` means
// the service declined the operation.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::create_archive;
use crate::error::{render, Error, Failure, FailureKind, IoContext, Outcome, Result};
use crate::hash::sha256_file;
use crate::identity::{self, Identity, STABLE_LABEL};
use crate::listing::{ListFilter, Listing};
use crate::readme::{render_model_readme, render_module_readme, write_readme};
use crate::ui::{is_affirmative, Prompter, TerminalPrompter};
use crate::validate::{validate_archived_artifact, validate_artifact, ModelLoader, SavedModelLoader};

pub const DEFAULT_PORT: u16 = 9500;
pub const MODEL_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
pub const MODULE_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_STABLE_ATTEMPTS: u32 = 3;

pub const UPLOAD_SUCCESS: &str = "Upload success!";
pub const NOTHING_TO_DO: &str = "Nothing to do";

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a finished call.
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn read(response: Response, url: &str) -> Result<Self> {
        let status = response.status();
        let body = response.text().map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(Reply { status, body })
    }

    /// The service signals success with exactly 200.
    fn ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// Connection to one TensorFlow Deploy instance.
#[derive(Clone, Debug)]
pub struct Service {
    client: Client,
    host: String,
    port: u16,
}

impl Service {
    /// Calls wait as long as the service needs (reloads and downloads can
    /// be slow). Only uploads and `/ping` set a per-request timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(Error::Client)?;
        Ok(Service {
            client,
            host: host.into(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url(), path)
    }

    /// Liveness probe. Any transport failure means the host is unreachable;
    /// the answer itself is only logged.
    pub fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.base_url());
        match self.client.get(&url).timeout(PING_TIMEOUT).send() {
            Ok(response) => {
                let body = response.text().unwrap_or_default();
                debug!(%body, "successful connection to TensorFlow Deploy");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "ping failed");
                Err(Error::Unreachable {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
        }
    }

    /// List models matching `filter`. Empty filter fields match anything.
    pub fn list_models(&self, filter: &ListFilter) -> Result<Outcome<Listing>> {
        self.list("models", "list_models", filter, true)
    }

    /// List modules matching `filter`. Modules carry no label.
    pub fn list_modules(&self, filter: &ListFilter) -> Result<Outcome<Listing>> {
        self.list("modules", "list_modules", filter, false)
    }

    fn list(
        &self,
        kind: &str,
        operation: &'static str,
        filter: &ListFilter,
        labelled: bool,
    ) -> Result<Outcome<Listing>> {
        let filter = filter.normalized()?;
        let url = self.url(&format!("{}/list", kind));
        let reply = self.call(Method::GET, &url, &filter.query(labelled))?;
        if !reply.ok() {
            return Ok(Err(Failure::rejected(operation, reply.body)));
        }
        Ok(Ok(Listing::parse(&reply.body, labelled)?))
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        request.send().map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })
    }

    fn call(&self, method: Method, url: &str, query: &[(&str, String)]) -> Result<Reply> {
        debug!(%method, %url, "calling TensorFlow Deploy");
        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = self.send(request, url)?;
        Reply::read(response, url)
    }
}

/// Builder for `Cursor`. `team`, `project` and `host` are mandatory, the
/// rest have defaults.
pub struct CursorBuilder {
    team: String,
    project: String,
    host: String,
    name: Option<String>,
    label: Option<String>,
    port: u16,
    verbose: bool,
    check_connection: bool,
    prompter: Option<Box<dyn Prompter>>,
    loader: Option<Box<dyn ModelLoader>>,
}

impl CursorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Probe `/ping` while building (on by default).
    pub fn check_connection(mut self, check: bool) -> Self {
        self.check_connection = check;
        self
    }

    pub fn prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Some(Box::new(prompter));
        self
    }

    pub fn loader(mut self, loader: impl ModelLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn build(self) -> Result<Cursor> {
        debug!(
            team = %self.team,
            project = %self.project,
            name = ?self.name,
            label = ?self.label,
            host = %self.host,
            port = self.port,
            verbose = self.verbose,
            "initial params"
        );
        let identity = Identity::new(
            &self.team,
            &self.project,
            self.name.as_deref(),
            self.label.as_deref(),
        )?;
        let service = Service::new(self.host, self.port)?;
        if self.check_connection {
            service.ping()?;
        }
        info!("initialisation success");

        Ok(Cursor {
            service,
            identity,
            verbose: self.verbose,
            check_connection: self.check_connection,
            prompter: self.prompter.unwrap_or_else(|| Box::new(TerminalPrompter)),
            loader: self.loader.unwrap_or_else(|| Box::new(SavedModelLoader)),
        })
    }
}

/// Identity-bound session against one TensorFlow Deploy instance.
pub struct Cursor {
    service: Service,
    identity: Identity,
    verbose: bool,
    check_connection: bool,
    prompter: Box<dyn Prompter>,
    loader: Box<dyn ModelLoader>,
}

impl Cursor {
    pub fn builder(
        team: impl Into<String>,
        project: impl Into<String>,
        host: impl Into<String>,
    ) -> CursorBuilder {
        CursorBuilder {
            team: team.into(),
            project: project.into(),
            host: host.into(),
            name: None,
            label: None,
            port: DEFAULT_PORT,
            verbose: false,
            check_connection: true,
            prompter: None,
            loader: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Upload a model directory or `.tar` archive under `label` (the
    /// cursor's label when `None`).
    pub fn upload_model(&self, src: &Path, label: Option<&str>, timeout: Duration) -> Result<Outcome> {
        let label = self.label_or_default(label)?;
        let url = self.names_url("models", &format!("labels/{}", label))?;
        self.upload(src, &url, timeout)
    }

    pub fn upload_module(&self, src: &Path, timeout: Duration) -> Result<Outcome> {
        let url = self.names_url("modules", "")?;
        self.upload(src, &url, timeout)
    }

    /// Upload a model, then reload the serving instances. Nothing is
    /// reloaded when the upload fails.
    pub fn deploy_model(&self, src: &Path, label: Option<&str>) -> Result<Outcome> {
        match self.upload_model(src, label, MODEL_UPLOAD_TIMEOUT)? {
            Err(upload) => Ok(Err(Failure::new(FailureKind::DeployAborted {
                upload: Box::new(upload),
            }))),
            Ok(upload) => {
                let reload = self.reload_config(true)?;
                Ok(Ok(format!(
                    "Deploy results:\nupload: {}\nreload: {}",
                    upload,
                    render(&reload)
                )))
            }
        }
    }

    /// Download a model into the directory `dst`. `version` wins over
    /// `label`; without either the cursor's label is used.
    pub fn get_model(&self, dst: &Path, version: Option<u32>, label: Option<&str>) -> Result<Outcome> {
        if !dst.is_dir() {
            return Ok(Err(Failure::new(FailureKind::NotADirectory)));
        }
        let tail = match (positive(version), label) {
            (Some(version), _) => format!("versions/{}", version),
            (None, label) => format!("labels/{}", self.label_or_default(label)?),
        };
        let url = self.names_url("models", &tail)?;
        let target = dst.join(format!("model_{}.tar", Uuid::new_v4().simple()));
        Ok(self
            .download(&url, dst, &target)?
            .map(|()| format!("Model successfully written to {}", target.display())))
    }

    pub fn get_module(&self, dst: &Path, version: u32) -> Result<Outcome> {
        if !dst.is_dir() {
            return Ok(Err(Failure::new(FailureKind::NotADirectory)));
        }
        let url = self.names_url("modules", &format!("versions/{}", version))?;
        let target = dst.join(format!("module_{}.tar", Uuid::new_v4().simple()));
        Ok(self
            .download(&url, dst, &target)?
            .map(|()| format!("Module successfully written to {}", target.display())))
    }

    pub fn list_models(&self, filter: &ListFilter) -> Result<Outcome<Listing>> {
        self.service.list_models(filter)
    }

    pub fn list_modules(&self, filter: &ListFilter) -> Result<Outcome<Listing>> {
        self.service.list_modules(filter)
    }

    /// Remove `label` from the model. The reserved `stable` label is
    /// refused by the service.
    pub fn delete_label(&self, label: &str) -> Result<Outcome> {
        let label = identity::required("LABEL", label)?;
        let url = self.names_url("models", &format!("labels/{}", label))?;
        if !self.confirm("remove", "label", None)? {
            return Ok(Ok(NOTHING_TO_DO.to_string()));
        }
        Ok(self
            .rest(Method::DELETE, &url, "delete_label")?
            .map(|body| format!("delete_label success: {}", body)))
    }

    /// Remove one model version, addressed by exactly one of `version` or
    /// `label`.
    pub fn delete_model(&self, version: Option<u32>, label: Option<&str>) -> Result<Outcome> {
        let label = label.filter(|l| !l.is_empty());
        let (tail, version) = match (positive(version), label) {
            (Some(version), None) => (format!("versions/{}", version), Some(version)),
            (None, Some(label)) => (
                format!("labels/{}/remove_version", identity::normalize("LABEL", label)?),
                None,
            ),
            _ => {
                return Err(Error::MissingParameter(
                    "One of two parameters must be given: version or label",
                ))
            }
        };
        let url = self.names_url("models", &tail)?;
        if !self.confirm("remove", "model", version)? {
            return Ok(Ok(NOTHING_TO_DO.to_string()));
        }
        Ok(self
            .rest(Method::DELETE, &url, "delete_model")?
            .map(|body| format!("delete_model success: {}", body)))
    }

    pub fn delete_module(&self, version: u32) -> Result<Outcome> {
        let url = self.names_url("modules", &format!("versions/{}", version))?;
        if !self.confirm("remove", "module", Some(version))? {
            return Ok(Ok(NOTHING_TO_DO.to_string()));
        }
        Ok(self
            .rest(Method::DELETE, &url, "delete_module")?
            .map(|body| format!("delete_module success: {}", body)))
    }

    /// Point `label` (the cursor's label when `None`) at `version`, then
    /// run a full reload.
    pub fn set_label(&self, version: Option<u32>, label: Option<&str>) -> Result<Outcome> {
        let version = positive(version).ok_or(Error::MissingParameter(
            "You need to specify version as the first argument",
        ))?;
        let label = self.label_or_default(label)?;
        let url = self.names_url("models", &format!("versions/{}/labels/{}", version, label))?;

        let body = match self.rest(Method::PUT, &url, "set_label")? {
            Ok(body) => body,
            Err(failure) => return Ok(Err(failure)),
        };
        let reload = self.reload_config(false)?;
        Ok(Ok(format!("set_label success: {}, reload: {}", body, render(&reload))))
    }

    /// Promote `version` to `stable`, retrying the assignment up to
    /// `attempts` times, then run a full reload.
    pub fn set_stable(&self, version: Option<u32>, attempts: u32) -> Result<Outcome> {
        let version = positive(version).ok_or(Error::MissingParameter("You need to specify model version"))?;
        let url = self.names_url(
            "models",
            &format!("versions/{}/labels/{}", version, STABLE_LABEL),
        )?;

        if !self.confirm("set stable", "label for model", Some(version))? {
            return Ok(Ok(NOTHING_TO_DO.to_string()));
        }

        let mut errors = Vec::new();
        let mut accepted = None;
        for attempt in 0..attempts {
            let reply = self.service.call(Method::PUT, &url, &[])?;
            if reply.ok() {
                accepted = Some(reply.body);
                break;
            }
            warn!(attempt, status = %reply.status, "set_stable attempt failed");
            errors.push(format!("#{} error: {}", attempt, reply.body));
        }
        let Some(body) = accepted else {
            return Ok(Err(Failure::new(FailureKind::AttemptsExhausted { errors })));
        };

        let reload = self.reload_config(false)?;
        Ok(Ok(format!(
            "set_stable success: {}, reload status: {}",
            body,
            render(&reload)
        )))
    }

    /// Reload every serving instance of the project. `short_reload` is
    /// forwarded as `SkipShortConfig`.
    pub fn reload_config(&self, short_reload: bool) -> Result<Outcome> {
        let url = self.project_url("reload");
        let reply = self.service.call(
            Method::POST,
            &url,
            &[("SkipShortConfig", short_reload.to_string())],
        )?;
        if !reply.ok() {
            return Ok(Err(Failure::rejected("reload_config", reply.body)));
        }
        Ok(Ok("reload_config success!".to_string()))
    }

    /// Restore the previous stable version. The service remembers a single
    /// previous version, so this only works once per promotion.
    pub fn revert_model(&self) -> Result<Outcome> {
        let url = self.names_url("models", "revert")?;
        Ok(self
            .rest(Method::PUT, &url, "revert_model")?
            .map(|body| format!("revert_model success!\n{}", body)))
    }

    /// Current serving configuration, verbatim.
    pub fn get_config(&self) -> Result<Outcome> {
        let url = self.project_url("config");
        self.rest(Method::GET, &url, "get_config")
    }

    pub fn generate_model_readme(
        &self,
        dst: &Path,
        description: &str,
        metrics: &[(String, String)],
    ) -> Result<()> {
        let readme = render_model_readme(&self.identity, description, metrics, Local::now());
        write_readme(dst, &readme)
    }

    pub fn generate_module_readme(&self, dst: &Path, description: &str) -> Result<()> {
        let readme = render_module_readme(&self.identity, description, Local::now());
        write_readme(dst, &readme)
    }

    fn upload(&self, src: &Path, url: &str, timeout: Duration) -> Result<Outcome> {
        debug!(src = %src.display(), "uploading artifact");
        if src.is_dir() {
            debug!("src_path is a directory");
            validate_artifact(self.loader.as_ref(), src)?;
            // removed when `staged` drops, on every path out of this block
            let staged = tempfile::Builder::new()
                .prefix("tmp_upload_")
                .suffix(".tar")
                .tempfile()
                .io_context(|| "create temporary upload archive")?;
            let digest = create_archive(src, staged.path())?;
            debug!(archive = %staged.path().display(), %digest, "archive staged");
            self.send_archive(url, staged.path(), &digest, timeout)
        } else if src.extension().map_or(true, |ext| ext != "tar") {
            debug!("src_path is not a tar archive");
            Ok(Err(Failure::new(FailureKind::UnexpectedExtension)))
        } else {
            debug!("src_path is a tar archive");
            validate_archived_artifact(self.loader.as_ref(), src)?;
            let digest = sha256_file(src)?;
            debug!(%digest, "archive hash");
            self.send_archive(url, src, &digest, timeout)
        }
    }

    fn send_archive(&self, url: &str, archive: &Path, digest: &str, timeout: Duration) -> Result<Outcome> {
        let form = multipart::Form::new()
            .file("archive_data", archive)
            .io_context(|| format!("open archive {}", archive.display()))?
            .text("archive_hash", digest.to_string());

        debug!(%url, "uploading archive");
        let request = self.service.client.post(url).multipart(form).timeout(timeout);
        let reply = Reply::read(self.service.send(request, url)?, url)?;
        debug!(body = %reply.body, "upload result");
        if !reply.ok() {
            return Ok(Err(Failure::with_response(
                FailureKind::UploadRejected,
                reply.body,
            )));
        }
        Ok(Ok(UPLOAD_SUCCESS.to_string()))
    }

    /// Stream the body of `url` into `target`. The bytes land in a scratch
    /// file inside `dir` first, so a failed transfer leaves nothing behind.
    fn download(&self, url: &str, dir: &Path, target: &Path) -> Result<Outcome<()>> {
        let mut response = self.service.send(self.service.client.get(url), url)?;
        if response.status() != StatusCode::OK {
            let reply = Reply::read(response, url)?;
            return Ok(Err(Failure::with_response(
                FailureKind::DownloadRejected,
                reply.body,
            )));
        }

        let mut scratch = tempfile::Builder::new()
            .prefix(".download_")
            .tempfile_in(dir)
            .io_context(|| format!("create download file in {}", dir.display()))?;
        let written = io::copy(&mut response, scratch.as_file_mut())
            .io_context(|| format!("download {}", url))?;
        scratch
            .persist(target)
            .map_err(|err| Error::io(format!("write {}", target.display()), err.error))?;
        debug!(bytes = written, target = %target.display(), "download finished");
        Ok(Ok(()))
    }

    fn rest(&self, method: Method, url: &str, operation: &'static str) -> Result<Outcome> {
        let reply = self.service.call(method, url, &[])?;
        if !reply.ok() {
            return Ok(Err(Failure::rejected(operation, reply.body)));
        }
        Ok(Ok(reply.body))
    }

    fn confirm(&self, action: &str, what: &str, version: Option<u32>) -> Result<bool> {
        let mut question = format!(
            "Are You sure to {} {} for given parameters?\nParameters:\nTEAM: {}\nPROJECT: {}\nNAME: {}",
            action,
            what,
            self.identity.team(),
            self.identity.project(),
            self.identity.name().unwrap_or("")
        );
        if let Some(version) = version {
            question.push_str(&format!("\nVERSION: {}", version));
        }
        let answer = self.prompter.ask(&question).map_err(Error::Prompt)?;
        Ok(is_affirmative(&answer))
    }

    fn label_or_default(&self, label: Option<&str>) -> Result<String> {
        match label {
            Some(label) if !label.is_empty() => identity::normalize("LABEL", label),
            _ => Ok(self.identity.label().to_string()),
        }
    }

    fn project_url(&self, tail: &str) -> String {
        self.service.url(&format!(
            "models/{}/{}/{}",
            self.identity.team(),
            self.identity.project(),
            tail
        ))
    }

    fn names_url(&self, kind: &str, tail: &str) -> Result<String> {
        let mut path = format!(
            "{}/{}/{}/names/{}",
            kind,
            self.identity.team(),
            self.identity.project(),
            self.identity.require_name()?
        );
        if !tail.is_empty() {
            path.push('/');
            path.push_str(tail);
        }
        Ok(self.service.url(&path))
    }
}

fn positive(version: Option<u32>) -> Option<u32> {
    version.filter(|v| *v > 0)
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TensorFlow Deploy cursor\n{}\nHost: {}\nPort: {}\nVerbose: {}\nCheck connection: {}",
            self.identity,
            self.service.host,
            self.service.port,
            self.verbose,
            self.check_connection
        )
    }
}
