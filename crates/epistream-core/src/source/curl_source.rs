//! libcurl adapter for `ContentSource`.
//!
//! Each `open` runs one blocking curl transfer on the blocking pool. Headers
//! are reported through a oneshot as soon as the first body byte (or the end
//! of the transfer) arrives; body chunks flow through a bounded channel, so a
//! slow disk writer applies backpressure to the socket. Dropping the stream
//! aborts the transfer from the progress callback.

use async_trait::async_trait;
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::HashMap;
use std::str;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::headers::{parse_head, ResponseHead};
use super::{ContentSource, SourceStream};
use crate::config::{EndpointConfig, FetchConfig};
use crate::job::ObjectId;
use crate::retry::TransferError;

const BODY_CHANNEL_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct CurlContentSource {
    base_url: String,
    headers: HashMap<String, String>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl CurlContentSource {
    pub fn new(endpoint: &EndpointConfig, fetch: &FetchConfig) -> Self {
        Self {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            headers: endpoint.headers.clone(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(fetch.idle_timeout_secs.max(1)),
        }
    }

    fn url_for(&self, id: &ObjectId) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

struct Transfer {
    url: String,
    headers: HashMap<String, String>,
    offset: u64,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

type HeadResult = Result<ResponseHead, TransferError>;

fn status_error(code: u32, url: &str) -> TransferError {
    if code == 404 || code == 410 {
        TransferError::NotFound(url.to_string())
    } else {
        TransferError::Http(code)
    }
}

fn run_transfer(
    t: Transfer,
    head_tx: oneshot::Sender<HeadResult>,
    body_tx: mpsc::Sender<Result<Bytes, TransferError>>,
) {
    let head_tx = RefCell::new(Some(head_tx));
    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let mut rejected = false;

    let result = (|| -> Result<(), TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&t.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.fail_on_error(true)?;
        easy.connect_timeout(t.connect_timeout)?;
        easy.low_speed_limit(1)?;
        easy.low_speed_time(t.idle_timeout)?;
        easy.progress(true)?;

        let mut list = curl::easy::List::new();
        for (k, v) in &t.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        if t.offset > 0 {
            list.append(&format!("Range: bytes={}-", t.offset))?;
        }
        easy.http_headers(list)?;

        let perform = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.borrow_mut().push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if let Some(tx) = head_tx.borrow_mut().take() {
                    let head = parse_head(&lines.borrow());
                    if tx.send(Ok(head)).is_err() {
                        return Ok(0);
                    }
                }
                match body_tx.blocking_send(Ok(Bytes::copy_from_slice(data))) {
                    Ok(()) => Ok(data.len()),
                    Err(_) => {
                        rejected = true;
                        Ok(0)
                    }
                }
            })?;
            transfer.progress_function(|_, _, _, _| !body_tx.is_closed())?;
            transfer.perform()
        };

        match perform {
            Ok(()) => Ok(()),
            Err(e) if e.is_http_returned_error() => {
                let code = easy.response_code().unwrap_or(0);
                Err(status_error(code, &t.url))
            }
            Err(e) => Err(TransferError::Curl(e)),
        }
    })();

    if rejected {
        // The reader went away; nobody is listening for the outcome.
        return;
    }
    match (head_tx.into_inner(), result) {
        (Some(tx), Ok(())) => {
            let _ = tx.send(Ok(parse_head(&lines.borrow())));
        }
        (Some(tx), Err(e)) => {
            let _ = tx.send(Err(e));
        }
        (None, Ok(())) => {}
        (None, Err(e)) => {
            let _ = body_tx.blocking_send(Err(e));
        }
    }
}

#[async_trait]
impl ContentSource for CurlContentSource {
    async fn open(&self, id: &ObjectId, offset: u64) -> Result<SourceStream, TransferError> {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let transfer = Transfer {
            url: self.url_for(id),
            headers: self.headers.clone(),
            offset,
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
        };
        tracing::debug!(object_id = %id, offset, url = %transfer.url, "opening source transfer");
        tokio::task::spawn_blocking(move || run_transfer(transfer, head_tx, body_tx));

        let head = head_rx
            .await
            .map_err(|_| TransferError::Connection("source transfer ended without a response".into()))??;
        let (start_offset, total_len) = head.placement();

        let body = futures::stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(SourceStream {
            start_offset,
            total_len,
            body: Box::pin(body),
        })
    }
}
