use operator_api::Credentials;

use crate::client::ClusterClient;

/// Errors raised while reading a `Backup`'s credential secret.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("credential secret {0} not found in operator namespace")]
    NotFound(String),
}

/// Read `secret_name` from the operator's namespace and extract the key set
/// `backupTo` targets recognize (spec.md §3, §6 "Credential secret layout").
pub(crate) async fn resolve(client: &ClusterClient, operator_namespace: &str, secret_name: &str) -> Result<Credentials, Error> {
    let secret = client
        .secrets(operator_namespace)
        .get_opt(secret_name)
        .await?
        .ok_or_else(|| Error::NotFound(secret_name.to_owned()))?;
    let data = secret.data.unwrap_or_default();
    let key = |name: &str| data.get(name).map(|v| String::from_utf8_lossy(&v.0).into_owned());

    Ok(Credentials {
        restic_password: key("RESTIC_PASSWORD"),
        access_key: key("MINIO_ACCESS_KEY"),
        secret_key: key("MINIO_SECRET_KEY"),
        username: key("SFTP_USERNAME"),
        password: key("SFTP_PASSWORD"),
    })
}
