pub mod chatbot;
pub mod cli;
pub mod connection;
pub mod error;
pub mod models;
pub mod render;
pub mod staff;
pub mod terminal;
pub mod transport;
pub mod widget;

use chatbot::store::{ FileStore, MemoryStore, SessionStore };
use chatbot::{ ChatbotWidget, HttpChatbot };
use cli::{ Args, Mode };
use futures::StreamExt;
use log::{ error, info };
use std::error::Error;
use std::time::Duration;
use terminal::{ Terminal, HELP };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use transport::stomp::{ StompConfig, StompTransport };
use widget::{ parse_input, ChatWidget, Flow, Input };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Mode: {:?}", args.mode);
    info!("Broker URL: {}", args.broker_url);
    info!("Broker Host: {}", args.broker_host);
    info!("Reconnect Delay: {} ms", args.reconnect_delay_ms);
    info!("Heart-beat: {} ms", args.heartbeat_ms);
    info!("HTTP Base: {}", args.http_base);
    info!("Chatbot Endpoint: {}", args.chatbot_endpoint);
    info!("Session File: {}", args.session_file.as_deref().unwrap_or("(memory)"));
    info!("-------------------------");

    match args.mode {
        Mode::Chat => run_chat(&args).await,
        Mode::Chatbot =>
            match &args.session_file {
                Some(path) => {
                    run_chatbot(&args, FileStore::open(path)).await
                }
                None => run_chatbot(&args, MemoryStore::default()).await,
            }
    }
}

async fn run_chat(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let username = args.username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or("A username is required in chat mode (--username or CHAT_USERNAME)")?
        .to_string();

    let config = StompConfig::new(&args.broker_url, &args.broker_host)?
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms))
        .with_heartbeat(Duration::from_millis(args.heartbeat_ms));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let transport = StompTransport::new(config, events_tx);

    let mut widget = ChatWidget::new(transport, args.http_base.clone());
    let mut terminal = Terminal::default();
    widget.connect(&username).await?;
    terminal.show_status(widget.manager().status());

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => match parse_input(&line) {
                    Input::Help => println!("{}", HELP),
                    input => match widget.apply(input).await {
                        Ok(Flow::Leave) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => error!("Failed to handle input: {}", e),
                    },
                },
                Some(Err(e)) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
                None => break,
            },
            event = events_rx.recv() => match event {
                Some(event) => widget.on_event(event).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; leaving chat");
                break;
            }
        }
        terminal.show_status(widget.manager().status());
        terminal.flush(widget.list());
    }

    widget.leave().await;
    terminal.show_status(widget.manager().status());
    Ok(())
}

async fn run_chatbot<S: SessionStore>(
    args: &Args,
    store: S
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut widget = ChatbotWidget::new(HttpChatbot::new(args.chatbot_endpoint.clone()), store);
    let mut terminal = Terminal::default();
    terminal.flush(widget.list());

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    while widget.input().enabled {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        match line {
            Some(Ok(line)) => {
                widget.submit(&line).await;
                terminal.flush(widget.list());
            }
            Some(Err(e)) => {
                error!("Failed to read input: {}", e);
                break;
            }
            None => break,
        }
    }
    if !widget.input().enabled {
        println!("{}", widget.input().placeholder);
    }
    Ok(())
}
