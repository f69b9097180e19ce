//! Path: crates/sim-liveio/src/bridge.rs
//! `WebHandler`/`LlmHandler` expose synchronous `handle()` methods (they are
//! invoked from inside the Engine's single-threaded, synchronous call stack),
//! but live network I/O is inherently async. Rather than `block_on` from
//! within a thread that may itself already be driving a runtime — which
//! panics on a nested `block_on` — every live call is dispatched onto a
//! dedicated OS thread that owns its own multi-thread Tokio runtime. The
//! calling thread blocks on a plain `std::sync::mpsc` reply channel, which is
//! safe to do from any thread, async or not.

use std::sync::mpsc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;

use sim_engine::{LlmRequest, LlmResponse, WebRequest, WebResponse};

use crate::llm::LiveLlmConfig;

enum Job {
    Web { request: WebRequest, browser: bool, reply: mpsc::Sender<WebResponse> },
    Llm { request: LlmRequest, config: LiveLlmConfig, reply: mpsc::Sender<LlmResponse> },
}

/// A handle to the background thread; cloneable so both `LiveWebHandler` and
/// `LiveLlmHandler` can share one worker.
#[derive(Clone)]
pub struct Bridge {
    tx: mpsc::Sender<Job>,
}

impl Bridge {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("sim-liveio-bridge".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .expect("failed to start sim-liveio bridge runtime");
                let client = reqwest::Client::new();
                while let Ok(job) = rx.recv() {
                    let client = client.clone();
                    runtime.spawn(async move {
                        match job {
                            Job::Web { request, browser, reply } => {
                                let response = run_web(&client, request, browser).await;
                                let _ = reply.send(response);
                            }
                            Job::Llm { request, config, reply } => {
                                let response = crate::llm::run_live(&client, request, config).await;
                                let _ = reply.send(response);
                            }
                        }
                    });
                }
            })
            .expect("failed to spawn sim-liveio bridge thread");
        Self { tx }
    }

    pub fn web_request(&self, request: WebRequest, browser: bool) -> WebResponse {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(Job::Web { request, browser, reply: reply_tx })
            .is_err()
        {
            return WebResponse { status: 502, headers: Default::default(), body: b"sim-liveio bridge thread is gone".to_vec() };
        }
        reply_rx.recv().unwrap_or(WebResponse {
            status: 502,
            headers: Default::default(),
            body: b"sim-liveio bridge thread dropped the reply channel".to_vec(),
        })
    }

    pub fn llm_request(&self, request: LlmRequest, config: LiveLlmConfig) -> LlmResponse {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(Job::Llm { request, config, reply: reply_tx })
            .is_err()
        {
            return LlmResponse { text: "sim-liveio bridge thread is gone".to_string(), structured: None };
        }
        reply_rx.recv().unwrap_or(LlmResponse {
            text: "sim-liveio bridge thread dropped the reply channel".to_string(),
            structured: None,
        })
    }
}

async fn run_web(client: &reqwest::Client, request: WebRequest, browser: bool) -> WebResponse {
    let is_get = request.method.eq_ignore_ascii_case("GET");
    if browser && is_get {
        render_in_browser(&request.url).await
    } else {
        perform_http(client, request).await
    }
}

async fn perform_http(client: &reqwest::Client, request: WebRequest) -> WebResponse {
    let method = match reqwest::Method::from_bytes(request.method.as_bytes()) {
        Ok(method) => method,
        Err(_) => return error_response(format!("invalid http method {:?}", request.method)),
    };
    let mut builder = client.request(method, &request.url).body(request.body.clone());
    for (key, value) in &request.headers {
        builder = builder.header(key, value);
    }
    match builder.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
                .collect();
            let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            WebResponse { status, headers, body }
        }
        Err(err) => error_response(format!("http request failed: {err}")),
    }
}

async fn render_in_browser(url: &str) -> WebResponse {
    let config = match BrowserConfig::builder().build() {
        Ok(config) => config,
        Err(err) => return error_response(format!("browser config error: {err}")),
    };
    let (browser, mut handler) = match Browser::launch(config).await {
        Ok(pair) => pair,
        Err(err) => return error_response(format!("browser launch failed: {err}")),
    };
    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let rendered = async {
        let page = browser.new_page(url).await?;
        page.wait_for_navigation().await?;
        page.content().await
    }
    .await;

    handler_task.abort();
    match rendered {
        Ok(html) => WebResponse { status: 200, headers: Default::default(), body: html.into_bytes() },
        Err(err) => error_response(format!("browser render failed: {err}")),
    }
}

fn error_response(message: String) -> WebResponse {
    WebResponse { status: 502, headers: Default::default(), body: message.into_bytes() }
}
