use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::AsyncReadExt;

/// Captured output of an in-pod command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors raised while executing a command inside a pod.
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to read exec stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("exec attach produced no {0} stream")]
    MissingStream(&'static str),
}

/// A single in-pod command execution, modeled as a short-lived builder so
/// call sites read like a one-shot RPC rather than a raw `kube::api::Api::exec`
/// invocation.
#[derive(Debug, Clone)]
pub struct ExecCommand {
    pod: String,
    namespace: String,
    container: Option<String>,
}

impl ExecCommand {
    #[must_use]
    pub fn new(pod: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            namespace: namespace.into(),
            container: None,
        }
    }

    #[must_use]
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }

    /// Execute `command` inside the target pod and collect its stdout/stderr.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the API rejects the exec request or the attached
    /// stream cannot be read to completion.
    pub async fn execute(&self, client: Client, command: &[String]) -> Result<(ExecOutput, bool), ExecError> {
        let pods: Api<Pod> = Api::namespaced(client, &self.namespace);
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(ref container) = self.container {
            params = params.container(container);
        }
        let mut attached = pods.exec(&self.pod, command, &params).await?;

        let mut stdout = String::new();
        if let Some(mut stream) = attached.stdout() {
            stream.read_to_string(&mut stdout).await?;
        }
        let mut stderr = String::new();
        if let Some(mut stream) = attached.stderr() {
            stream.read_to_string(&mut stderr).await?;
        }

        let status = attached.take_status().map(|s| s.await).unwrap_or(None);
        attached.join().await?;

        let ok = status
            .map(|s| s.status.as_deref() == Some("Success"))
            .unwrap_or(true);

        Ok((ExecOutput { stdout, stderr }, ok))
    }
}
