use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use ldap_ber_codec::decoder::decode_message_with;
use ldap_ber_codec::{compute_length, encode, encode_filter, CodecConfig, CodecMetrics, DecoderError, Filter, LdapCodec};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ldap-ber")]
#[command(about = "Decode and inspect LDAPv3 BER message streams")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a captured LDAP byte stream and check that it re-encodes
    Decode {
        /// Raw capture, or hex text with --hex
        file: PathBuf,

        /// Input is hex text (whitespace, ':' and ',' are ignored)
        #[arg(long)]
        hex: bool,

        /// Feed the decoder this many bytes at a time
        #[arg(long, value_name = "N", default_value_t = 4096)]
        chunk_size: usize,

        /// Codec configuration (YAML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Parse an RFC 4515 filter string and print its BER encoding
    Filter {
        filter: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("ldap_ber_codec={},ldap_ber={},warn", log_level, log_level))
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Decode {
            file,
            hex,
            chunk_size,
            config,
        } => decode_file(&file, hex, chunk_size, config.as_deref()).await,
        Command::Filter { filter } => print_filter(&filter),
    }
}

async fn decode_file(path: &Path, hex: bool, chunk_size: usize, config_path: Option<&Path>) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }
    let config = match config_path {
        Some(p) => CodecConfig::from_file(p)?,
        None => CodecConfig::default(),
    };
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let data = if hex {
        parse_hex(&String::from_utf8_lossy(&raw)).with_context(|| format!("invalid hex in {}", path.display()))?
    } else {
        raw
    };
    info!("Decoding {} bytes from {:?} in chunks of {}", data.len(), path, chunk_size);

    let pieces: Vec<io::Result<Bytes>> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let reader = StreamReader::new(futures::stream::iter(pieces));
    let metrics = Arc::new(CodecMetrics::new());
    let mut framed = FramedRead::new(reader, LdapCodec::with_metrics(config.clone(), Arc::clone(&metrics)));

    let mut reencoded = Vec::with_capacity(data.len());
    let mut decoded = 0usize;
    let mut failures = 0usize;
    let mut mismatches = 0usize;
    let mut after_error = false;
    loop {
        match framed.next().await {
            Some(Ok(message)) => {
                after_error = false;
                decoded += 1;
                println!("{:#?}", message);
                let bytes = encode(&message);
                if bytes.len() != compute_length(&message)
                    || decode_message_with(&bytes, config.clone()).as_ref() != Ok(&message)
                {
                    warn!("message {} does not survive re-encoding", message.message_id);
                    mismatches += 1;
                }
                reencoded.extend_from_slice(&bytes);
            }
            Some(Err(e)) => {
                failures += 1;
                error!("Decode error: {}", e);
                if let Some(response) = e.decoder_error().and_then(DecoderError::response) {
                    println!("would respond with: {:?}", response);
                }
                if framed.decoder().is_failed() {
                    error!("Decoder cannot resynchronise, stopping");
                    break;
                }
                after_error = true;
            }
            // FramedRead yields one None right after an error
            None if after_error => after_error = false,
            None => break,
        }
    }

    info!(
        "Done: {} messages, {} errors, {} re-encoding mismatches",
        decoded,
        failures,
        mismatches
    );
    if failures == 0 && mismatches == 0 {
        if reencoded == data {
            info!("Re-encoded stream is byte-identical to the input");
        } else {
            warn!("Re-encoded stream differs from the input (non-minimal encodings in the capture)");
        }
    }
    eprint!("{}", metrics.render());

    if failures > 0 || mismatches > 0 {
        bail!("{} decode errors, {} re-encoding mismatches", failures, mismatches);
    }
    Ok(())
}

fn print_filter(input: &str) -> Result<()> {
    let filter = Filter::parse(input).with_context(|| format!("invalid filter {:?}", input))?;
    println!("{}", filter);
    let bytes = encode_filter(&filter);
    println!("{}", hex::encode(&bytes));
    Ok(())
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':' && *c != ',')
        .collect();
    hex::decode(&digits).map_err(|e| anyhow!("invalid hex input: {}", e))
}

#[cfg(test)]
mod tests {
    use super::parse_hex;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("30 05\n02:01,05 42 00").unwrap(), vec![0x30, 0x05, 0x02, 0x01, 0x05, 0x42, 0x00]);
        assert_eq!(parse_hex("DEad beef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(parse_hex("3").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("+f").is_err());
    }
}
