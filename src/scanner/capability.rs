use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::info;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};

const FEED_CAPACITY: usize = 64;

/// Something that turns camera frames (or a keyboard-wedge scanner) into
/// decoded text. Acquiring it hands back a feed; releasing it lets the
/// device go.
#[async_trait]
pub trait ScanCapability: Send + Sync {
    async fn acquire(&self) -> Result<mpsc::Receiver<String>>;

    async fn release(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process source: whoever holds the scanner pushes decoded text into it.
/// Also how an embedding decoder thread feeds a session.
pub struct ChannelScanner {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    available: AtomicBool,
}

impl Default for ChannelScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelScanner {
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a camera that refuses permission.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_acquired(&self) -> bool {
        lock(&self.sender).is_some()
    }

    /// Returns false when no session currently holds the scanner.
    pub async fn push(&self, text: impl Into<String>) -> bool {
        let sender = lock(&self.sender).clone();
        match sender {
            Some(sender) => sender.send(text.into()).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ScanCapability for ChannelScanner {
    async fn acquire(&self) -> Result<mpsc::Receiver<String>> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("scanner device unavailable");
        }
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        *lock(&self.sender) = Some(tx);
        Ok(rx)
    }

    async fn release(&self) {
        lock(&self.sender).take();
    }
}

/// Keyboard-wedge QR readers type the payload followed by Enter; each line
/// on stdin is one decode.
#[derive(Default)]
pub struct StdinScanner {
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdinScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanCapability for StdinScanner {
    async fn acquire(&self) -> Result<mpsc::Receiver<String>> {
        let mut reader = lock(&self.reader);
        if reader.is_some() {
            bail!("stdin scanner already in use");
        }

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        *reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if tx.send(line.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed; scanner feed ending");
                        break;
                    }
                    Err(err) => {
                        log::error!("failed to read scanner input: {err}");
                        break;
                    }
                }
            }
        }));
        Ok(rx)
    }

    async fn release(&self) {
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_scanner_delivers_while_acquired() {
        let scanner = ChannelScanner::new();
        assert!(!scanner.push("42").await);

        let mut feed = scanner.acquire().await.unwrap();
        assert!(scanner.push("42").await);
        assert_eq!(feed.recv().await.as_deref(), Some("42"));

        scanner.release().await;
        assert!(!scanner.is_acquired());
        assert!(!scanner.push("43").await);
        assert_eq!(feed.recv().await, None);
    }

    #[tokio::test]
    async fn unavailable_scanner_refuses_acquire() {
        let scanner = ChannelScanner::new();
        scanner.set_available(false);
        assert!(scanner.acquire().await.is_err());
    }
}
