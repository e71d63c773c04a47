//! Release asset downloads with progress reporting

use crate::error::{PurrError, Result};
use crate::release::ReleaseAsset;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// SHA256 of a file, hex encoded
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(file_path)
        .await
        .map_err(|e| PurrError::fs(format!("Failed to open {}", file_path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// File name to store an asset under. Asset names come from a remote API, so
/// only the final path component is kept.
pub fn local_file_name(asset: &ReleaseAsset) -> String {
    Path::new(&asset.name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or("asset.bin")
        .to_string()
}

/// Download a single asset into `dest_dir`, showing a progress bar on a TTY
pub async fn download_asset(
    client: &reqwest::Client,
    asset: &ReleaseAsset,
    dest_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| PurrError::fs("Failed to create download directory", e))?;
    let output_path = dest_dir.join(local_file_name(asset));

    tracing::debug!("GET {} -> {}", asset.download_url, output_path.display());
    let mut response = client
        .get(&asset.download_url)
        .send()
        .await?
        .error_for_status()?;

    let pb = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .map_err(|e| anyhow::anyhow!(e))?
                .progress_chars("#>-"),
        );
        pb.set_message(format!("⬇ {}", asset.name));
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut file = fs::File::create(&output_path)
        .await
        .map_err(|e| PurrError::fs(format!("Failed to create {}", output_path.display()), e))?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().await?;
    pb.finish_and_clear();
    tracing::debug!("downloaded {} bytes", downloaded);

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_name_strips_directories() {
        let asset = ReleaseAsset::new("../../etc/passwd", "u");
        assert_eq!(local_file_name(&asset), "passwd");
        let asset = ReleaseAsset::new("..", "u");
        assert_eq!(local_file_name(&asset), "asset.bin");
        let asset = ReleaseAsset::new("tool-linux-x64.zip", "u");
        assert_eq!(local_file_name(&asset), "tool-linux-x64.zip");
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/dl/tool")
            .with_status(200)
            .with_body("#!/bin/sh\necho hi\n")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let asset = ReleaseAsset::new("tool", format!("{}/dl/tool", server.url()));
        let path = download_asset(&reqwest::Client::new(), &asset, dir.path())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("tool"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#!/bin/sh\necho hi\n");
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/dl/gone").with_status(404).create_async().await;

        let dir = TempDir::new().unwrap();
        let asset = ReleaseAsset::new("gone", format!("{}/dl/gone", server.url()));
        let err = download_asset(&reqwest::Client::new(), &asset, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PurrError::Network(_)));
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
