//! blobxfer-rs: chunked transfers to and from Azure Blob Storage.

use bytes::Bytes;
use clap::Parser;
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blobxfer_rs::models::page_align_content_length;
use blobxfer_rs::operations::{self, block_blob};
use blobxfer_rs::{
    chunk_writer_for, AccessTier, Args, BlobClient, Command, Config, ContainerRegistry,
    ContentMd5, Offsets, RestClient, StorageEntity, StorageError, StorageMode,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let command = args.command.clone();
    let config = Config::from(args);
    let client: Arc<dyn BlobClient> = Arc::new(RestClient::new(
        config.storage_account()?,
        config.retry_policy(),
    )?);

    run(command, client, &config).await
}

async fn run(command: Command, client: Arc<dyn BlobClient>, config: &Config) -> Result<(), BoxError> {
    let timeout = config.timeout;
    match command {
        Command::Ls {
            container,
            prefix,
            mode,
            recursive,
        } => {
            let mut blobs =
                operations::list_blobs(client.as_ref(), &container, &prefix, mode, recursive, timeout)?;
            while let Some(blob) = blobs.try_next().await? {
                println!("{}", serde_json::to_string(&blob)?);
            }
        }
        Command::Stat {
            container,
            name,
            mode,
        } => {
            match operations::get_blob_properties(client.as_ref(), &container, &name, mode, timeout)
                .await?
            {
                Some(props) => println!("{}", serde_json::to_string_pretty(&props)?),
                None => return Err(format!("{}/{} does not exist", container, name).into()),
            }
        }
        Command::Blocks { container, name } => {
            let entity = StorageEntity::new(client, container, name, StorageMode::Block);
            for block in block_blob::get_committed_block_list(&entity, timeout).await? {
                println!("{}\t{}", block.name, block.size);
            }
        }
        Command::Rm { container, name } => {
            operations::delete_blob(client.as_ref(), &container, &name, timeout).await?;
            info!("deleted {}/{}", container, name);
        }
        Command::Mkcontainer { container } => {
            let entity = StorageEntity::new(client, container, "", StorageMode::Block);
            operations::ensure_container(&entity, &ContainerRegistry::new(), timeout).await?;
        }
        Command::Put {
            file,
            container,
            name,
            mode,
            chunk_size,
            access_tier,
        } => {
            let mut entity = StorageEntity::new(client, container, name, mode);
            if let Some(tier) = access_tier {
                let tier = AccessTier::from_str(&tier)
                    .ok_or_else(|| StorageError::invalid_input(format!("unknown access tier {}", tier)))?;
                entity = entity.access_tier(tier);
            }
            upload(&entity, &file, chunk_size, timeout).await?;
        }
        Command::Get {
            container,
            name,
            file,
            chunk_size,
        } => {
            download(client, &container, &name, &file, chunk_size, timeout).await?;
        }
    }
    Ok(())
}

async fn upload(
    entity: &StorageEntity,
    file: &Path,
    chunk_size: u64,
    timeout: Option<Duration>,
) -> Result<(), BoxError> {
    let data = Bytes::from(tokio::fs::read(file).await?);
    let len = data.len() as u64;
    let entity = entity.clone().size(len);
    let md5 = ContentMd5::of(&data);

    operations::ensure_container(&entity, &ContainerRegistry::new(), timeout).await?;

    let writer = chunk_writer_for(entity.mode)?;
    if writer.mode() == StorageMode::Block && len <= chunk_size {
        block_blob::create_blob(&entity, Some(data), Some(md5), None, timeout).await?;
        block_blob::set_blob_access_tier(&entity, timeout).await?;
        info!("uploaded {} bytes to {}/{}", len, entity.container, entity.name);
        return Ok(());
    }

    // Page writes must start on page boundaries.
    let chunk_size = match writer.mode() {
        StorageMode::Page => page_align_content_length(chunk_size.max(1)),
        _ => chunk_size.max(1),
    };

    writer.prepare(&entity, timeout).await?;
    let mut last_chunk_num = 0;
    for (chunk_num, start) in (0..len).step_by(chunk_size as usize).enumerate() {
        let end = (start + chunk_size).min(len);
        let offsets = Offsets::new(chunk_num as u64, start, end)?;
        let chunk = data.slice(start as usize..end as usize);
        writer.write_chunk(&entity, &offsets, Some(chunk), timeout).await?;
        last_chunk_num = chunk_num as u64;
    }
    writer
        .finalize(&entity, last_chunk_num, Some(md5), None, timeout)
        .await?;

    info!(
        "uploaded {} bytes to {}/{} as {} chunks",
        len,
        entity.container,
        entity.name,
        last_chunk_num + 1
    );
    Ok(())
}

async fn download(
    client: Arc<dyn BlobClient>,
    container: &str,
    name: &str,
    file: &Path,
    chunk_size: u64,
    timeout: Option<Duration>,
) -> Result<(), BoxError> {
    let props = operations::get_blob_properties(client.as_ref(), container, name, StorageMode::Auto, timeout)
        .await?
        .ok_or_else(|| format!("{}/{} does not exist", container, name))?;

    let mut entity = StorageEntity::new(client, container, name, StorageMode::Auto);
    entity.populate_from_blob(&props);

    let mut out = tokio::fs::File::create(file).await?;
    let chunk_size = chunk_size.max(1);
    for (chunk_num, start) in (0..entity.size).step_by(chunk_size as usize).enumerate() {
        let end = (start + chunk_size).min(entity.size);
        let offsets = Offsets::new(chunk_num as u64, start, end)?;
        let chunk = operations::get_blob_range(&entity, &offsets, timeout).await?;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    info!("downloaded {} bytes from {}/{}", entity.size, container, name);
    Ok(())
}
