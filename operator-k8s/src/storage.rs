use aws_sdk_s3::config::{Credentials as S3Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::Client as S3Client;
use ssh2::Session;
use std::net::TcpStream;
use tracing::{debug, warn};

use crd_api::v1alpha1::MinioTarget;
use operator_api::Credentials;

/// Errors raised while preparing a target's backend before the worker pod runs.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("failed to create bucket {bucket}: {source}")]
    Bucket {
        bucket: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("sftp mkdir failed for {path}: {source}")]
    Sftp {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pre-flight actions the Storage Router runs before handing a target to the
/// Worker Pod Manager (spec.md §4.5). Both are idempotent.
pub(crate) struct StorageRouter;

impl StorageRouter {
    /// Ensure `target.bucket` exists, tolerating "already owned by you".
    pub(crate) async fn ensure_minio_bucket(target: &MinioTarget, creds: &Credentials) -> Result<(), Error> {
        let endpoint = format!("{}://{}:{}", target.endpoint.scheme, target.endpoint.address, target.endpoint.port);
        let config = aws_sdk_s3::Config::builder()
            .region(Region::new(target.region.clone().unwrap_or_else(|| "us-east-1".to_owned())))
            .endpoint_url(endpoint)
            .credentials_provider(S3Credentials::new(
                creds.access_key.clone().unwrap_or_default(),
                creds.secret_key.clone().unwrap_or_default(),
                None,
                None,
                "horus-operator",
            ))
            .force_path_style(true)
            .build();
        let client = S3Client::from_conf(config);

        match client.create_bucket().bucket(&target.bucket).send().await {
            Ok(_) => {
                debug!(bucket = target.bucket.as_str(), "created bucket");
                Ok(())
            }
            Err(SdkError::ServiceError(err)) if matches!(err.err(), CreateBucketError::BucketAlreadyOwnedByYou(_)) => {
                debug!(bucket = target.bucket.as_str(), "bucket already exists");
                Ok(())
            }
            Err(err) => Err(Error::Bucket {
                bucket: target.bucket.clone(),
                source: Box::new(err),
            }),
        }
    }

    /// Open an SSH session and `mkdir -p` the SFTP repository path before
    /// restic connects, since restic's interactive prompting makes in-pod
    /// mkdir brittle (spec.md §4.5).
    pub(crate) fn ensure_sftp_path(address: &str, port: i32, path: &str, creds: &Credentials) -> Result<(), Error> {
        let tcp = TcpStream::connect((address, u16::try_from(port).unwrap_or(22)))
            .map_err(|source| Error::Sftp { path: path.to_owned(), source })?;
        let mut session = Session::new().map_err(|err| Error::Sftp {
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|err| Error::Sftp {
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        })?;
        session
            .userauth_password(
                creds.username.as_deref().unwrap_or("restic"),
                creds.password.as_deref().unwrap_or_default(),
            )
            .map_err(|err| Error::Sftp { path: path.to_owned(), source: std::io::Error::new(std::io::ErrorKind::Other, err) })?;

        let sftp = session.sftp().map_err(|err| Error::Sftp {
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        })?;
        if sftp.stat(std::path::Path::new(path)).is_ok() {
            debug!(path, "sftp path already exists");
            return Ok(());
        }
        mkdir_all(&sftp, path).map_err(|source| Error::Sftp { path: path.to_owned(), source })?;
        Ok(())
    }
}

fn mkdir_all(sftp: &ssh2::Sftp, path: &str) -> std::io::Result<()> {
    let mut built = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        built.push('/');
        built.push_str(component);
        if sftp.stat(std::path::Path::new(&built)).is_ok() {
            continue;
        }
        if let Err(err) = sftp.mkdir(std::path::Path::new(&built), 0o755) {
            warn!(path = built.as_str(), "sftp mkdir failed: {err}");
            return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
        }
    }
    Ok(())
}
