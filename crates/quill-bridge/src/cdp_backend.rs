//! CDP (Chrome DevTools Protocol) transport using chromiumoxide.
//!
//! Runs the engine in headless Chrome/Chromium. Engine messages posted to
//! `window.webkit.messageHandlers.<handler>` are rerouted through a page
//! binding and queued for [`Transport::pump`].

use crate::error::{BridgeError, Result};
use crate::pending::InvocationId;
use crate::transport::{Inbound, Transport};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::Page;
use futures::StreamExt;
use quill_config::CdpConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Name of the page binding engine messages are funneled through.
const BINDING: &str = "quillPostMessage";

fn handler_shim(message_handler: &str) -> String {
    format!(
        r#"(function() {{
  var post = function(body) {{
    window.{binding}(typeof body === "string" ? body : JSON.stringify(body));
  }};
  window.webkit = window.webkit || {{}};
  window.webkit.messageHandlers = window.webkit.messageHandlers || {{}};
  window.webkit.messageHandlers[{handler}] = {{ postMessage: post }};
}})();"#,
        binding = BINDING,
        handler = serde_json::Value::from(message_handler),
    )
}

/// Headless Chrome as the editing engine.
pub struct CdpTransport {
    runtime: Runtime,
    browser: Option<Browser>,
    page: Page,
    scripts: mpsc::UnboundedSender<(InvocationId, String)>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    held: VecDeque<Inbound>,
}

impl CdpTransport {
    /// Launch a browser and open a blank page wired for `message_handler`.
    pub fn launch(config: &CdpConfig, message_handler: &str) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| BridgeError::Transport(e.to_string()))?;

        let mut builder = BrowserConfig::builder().window_size(config.width, config.height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(BridgeError::Transport)?;

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (scripts, mut script_rx) = mpsc::unbounded_channel::<(InvocationId, String)>();
        let shim = handler_shim(message_handler);

        let (browser, page) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;

            tokio::spawn(async move { while handler.next().await.is_some() {} });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            page.execute(AddBindingParams::new(BINDING))
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(shim))
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;

            let mut bindings = page
                .event_listener::<EventBindingCalled>()
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            let posted = inbound_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = bindings.next().await {
                    if event.name != BINDING {
                        continue;
                    }
                    if posted.send(Inbound::Posted(event.payload.clone())).is_err() {
                        break;
                    }
                }
            });

            // One evaluation at a time keeps delivery in issuance order.
            let worker_page = page.clone();
            tokio::spawn(async move {
                while let Some((invocation, script)) = script_rx.recv().await {
                    let outcome = match worker_page.evaluate(script).await {
                        Ok(result) => Ok(result.value().cloned()),
                        Err(e) => Err(e.to_string()),
                    };
                    if inbound_tx
                        .send(Inbound::Completed {
                            invocation,
                            outcome,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            });

            Ok::<_, BridgeError>((browser, page))
        })?;

        tracing::info!(headless = config.headless, "CDP transport launched");
        Ok(Self {
            runtime,
            browser: Some(browser),
            page,
            scripts,
            inbound,
            held: VecDeque::new(),
        })
    }
}

impl Transport for CdpTransport {
    fn load(&mut self, base_url: &str) -> Result<()> {
        let page = self.page.clone();
        let url = base_url.to_string();
        self.runtime.block_on(async {
            page.goto(url)
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            Ok::<_, BridgeError>(())
        })
    }

    fn evaluate(&mut self, invocation: InvocationId, script: &str) -> Result<()> {
        self.scripts
            .send((invocation, script.to_string()))
            .map_err(|_| BridgeError::Transport("evaluation worker has stopped".to_string()))
    }

    fn pump(&mut self) -> Vec<Inbound> {
        let mut items: Vec<Inbound> = self.held.drain(..).collect();
        while let Ok(item) = self.inbound.try_recv() {
            items.push(item);
        }
        items
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        if !self.held.is_empty() {
            return true;
        }
        let inbound = &mut self.inbound;
        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, inbound.recv()).await });
        match received {
            Ok(Some(item)) => {
                self.held.push_back(item);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        self.runtime.block_on(async {
            browser
                .close()
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            Ok::<_, BridgeError>(())
        })
    }
}
