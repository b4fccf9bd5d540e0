// Classroom signaling CLI
// Operator tool for inspecting a running server and driving rooms by hand

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

#[derive(Parser)]
#[command(name = "classroom-cli")]
#[command(about = "Classroom signaling server CLI", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Connection token (sent as the `token` query param)
    #[arg(short, long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Show the ICE servers handed to clients
    Config,

    /// List active rooms
    Rooms,

    /// Open a websocket and print the resolved identity
    Connect {
        /// Development mode admin id
        #[arg(long)]
        admin_id: Option<String>,

        /// Development mode student id
        #[arg(long)]
        student_id: Option<String>,
    },

    /// Create a room as an instructor
    CreateRoom {
        #[arg(short, long)]
        room_id: String,

        #[arg(short, long)]
        course_id: String,

        /// Development mode admin or assistant id
        #[arg(long)]
        admin_id: Option<String>,

        /// Keep connection alive and print room events (press Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Join a room as a student
    JoinRoom {
        #[arg(short, long)]
        room_id: String,

        /// Development mode student id
        #[arg(long)]
        student_id: Option<String>,

        /// Keep connection alive and print room events (press Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Run automated validation scenarios
    Validate {
        /// Admin id known to the server's directory (enables room scenarios)
        #[arg(long)]
        admin_id: Option<String>,

        /// Course id known to the server's directory (enables room scenarios)
        #[arg(long)]
        course_id: Option<String>,
    },

    /// Interactive mode - send raw event frames
    Interactive {
        #[arg(long)]
        admin_id: Option<String>,

        #[arg(long)]
        student_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let token = cli.token.as_deref();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Config => check_config(&cli.server).await,
        Commands::Rooms => list_rooms(&cli.server).await,
        Commands::Connect {
            admin_id,
            student_id,
        } => {
            let url = ws_url(&cli.server, token, admin_id.as_deref(), student_id.as_deref());
            test_connection(&url).await;
        }
        Commands::CreateRoom {
            room_id,
            course_id,
            admin_id,
            keep_alive,
        } => {
            let url = ws_url(&cli.server, token, admin_id.as_deref(), None);
            create_room(&url, room_id, course_id, *keep_alive).await;
        }
        Commands::JoinRoom {
            room_id,
            student_id,
            keep_alive,
        } => {
            let url = ws_url(&cli.server, token, None, student_id.as_deref());
            join_room(&url, room_id, *keep_alive).await;
        }
        Commands::Validate {
            admin_id,
            course_id,
        } => {
            run_validations(&cli.server, admin_id.as_deref(), course_id.as_deref()).await;
        }
        Commands::Interactive {
            admin_id,
            student_id,
        } => {
            let url = ws_url(&cli.server, token, admin_id.as_deref(), student_id.as_deref());
            interactive_mode(&url).await;
        }
    }
}

fn ws_url(
    server: &str,
    token: Option<&str>,
    admin_id: Option<&str>,
    student_id: Option<&str>,
) -> String {
    let params: Vec<String> = [("token", token), ("adminId", admin_id), ("studentId", student_id)]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| format!("{key}={}", urlencoding::encode(v))))
        .collect();

    if params.is_empty() {
        format!("ws://{server}/classroom")
    } else {
        format!("ws://{server}/classroom?{}", params.join("&"))
    }
}

fn frame(event: &str, data: Value, ack: Option<u64>) -> Message {
    let mut frame = json!({ "event": event, "data": data });
    if let Some(id) = ack {
        frame["ack"] = json!(id);
    }
    Message::Text(frame.to_string())
}

/// Waits for the next event frame named `wanted`, skipping others
async fn next_event<S>(read: &mut S, wanted: &str, secs: u64) -> Option<Value>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let wait = async {
        while let Some(Ok(message)) = read.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                if value["event"] == wanted {
                    return Some(value);
                }
            }
        }
        None
    };
    timeout(Duration::from_secs(secs), wait).await.ok().flatten()
}

async fn get_json(server: &str, path: &str) -> Result<Value, String> {
    let url = format!("http://{server}{path}");
    let resp = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Cannot connect to server: {e}"))?;

    if !resp.status().is_success() {
        return Err(format!("Request failed: {}", resp.status()));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| format!("Invalid response body: {e}"))
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    match get_json(server, "/classroom/health").await {
        Ok(body) => {
            println!("{} Health check passed", "✓".green());
            println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
            println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching ICE configuration...".cyan());

    match get_json(server, "/classroom/config").await {
        Ok(body) => {
            println!("{} Config endpoint accessible\n", "✓".green());
            for entry in body["iceServers"].as_array().into_iter().flatten() {
                let urls: Vec<&str> = entry["urls"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .collect();
                let kind = if entry.get("credential").is_some() {
                    "TURN"
                } else {
                    "STUN"
                };
                println!("  {} {}", kind.bold(), urls.join(", "));
                if let Some(username) = entry["username"].as_str() {
                    println!("       username: {}", username);
                }
            }
            if let Some(ttl) = body["ttl"].as_u64() {
                println!("  Credential TTL: {}s", ttl);
            }
        }
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

async fn list_rooms(server: &str) {
    match get_json(server, "/classroom/rooms").await {
        Ok(Value::Array(rooms)) if rooms.is_empty() => {
            println!("{}", "No active rooms".yellow());
        }
        Ok(Value::Array(rooms)) => {
            println!(
                "{:<20} {:<24} {:<20} {:>8}  {}",
                "ROOM".bold(),
                "COURSE".bold(),
                "INSTRUCTOR".bold(),
                "STUDENTS".bold(),
                "STARTED".bold()
            );
            for room in rooms {
                println!(
                    "{:<20} {:<24} {:<20} {:>8}  {}",
                    room["roomId"].as_str().unwrap_or("?"),
                    room["courseTitle"].as_str().unwrap_or("?"),
                    room["instructorName"].as_str().unwrap_or("?"),
                    room["studentCount"].as_u64().unwrap_or(0),
                    room["createdAt"].as_str().unwrap_or("?")
                );
            }
        }
        Ok(other) => println!("{} Unexpected response: {}", "✗".yellow(), other),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

async fn test_connection(url: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    match connect_async(url).await {
        Ok((ws_stream, _)) => {
            let (_, mut read) = ws_stream.split();
            println!("{} WebSocket connection established", "✓".green());

            match next_event(&mut read, "connected", 5).await {
                Some(event) => {
                    let principal = &event["data"]["principal"];
                    println!("  Connection ID: {}", event["data"]["connectionId"]);
                    println!("  Principal: {} ({})", principal["name"], principal["role"]);
                }
                None => println!("{} No connected event received", "✗".yellow()),
            }
        }
        Err(e) => println!("{} WebSocket connection failed: {}", "✗".red(), e),
    }
}

fn print_ack(ack: &Value) -> bool {
    let data = &ack["data"];
    match data["error"].as_str() {
        Some(error) => {
            println!(
                "{} {} ({})",
                "✗".red(),
                error,
                data["code"].as_str().unwrap_or("error")
            );
            false
        }
        None => {
            println!("{} {}", "✓".green(), serde_json::to_string_pretty(data).unwrap_or_default());
            true
        }
    }
}

async fn create_room(url: &str, room_id: &str, course_id: &str, keep_alive: bool) {
    println!("{}", "Creating room...".cyan());
    println!("  Room ID: {}", room_id);
    println!("  Course ID: {}", course_id);

    let (ws_stream, _) = match connect_async(url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let msg = frame("create-room", json!({ "roomId": room_id, "courseId": course_id }), Some(1));
    if write.send(msg).await.is_err() {
        println!("{} Failed to send create-room", "✗".red());
        return;
    }

    let created = match next_event(&mut read, "ack", 5).await {
        Some(ack) => print_ack(&ack),
        None => {
            println!("{} Timeout waiting for response", "✗".red());
            false
        }
    };

    if keep_alive && created {
        println!("\n{}", "Connection is being kept alive...".yellow());
        println!("Students can now join room: {}", room_id.green().bold());
        println!("Press {} to disconnect and end the room.", "Ctrl+C".bold());
        print_events(&mut read).await;
    } else if created {
        println!("\n{}", "⚠ Note: Connection closed. The room has ended.".yellow());
        println!("Use {} to keep the room active.", "--keep-alive".cyan());
    }
}

async fn join_room(url: &str, room_id: &str, keep_alive: bool) {
    println!("{}", "Joining room...".cyan());
    println!("  Room ID: {}", room_id);

    let (ws_stream, _) = match connect_async(url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} Cannot connect: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if write
        .send(frame("join-room", json!({ "roomId": room_id }), Some(1)))
        .await
        .is_err()
    {
        println!("{} Failed to send join-room", "✗".red());
        return;
    }

    let joined = match next_event(&mut read, "ack", 5).await {
        Some(ack) => print_ack(&ack),
        None => {
            println!("{} Timeout", "✗".red());
            false
        }
    };

    if keep_alive && joined {
        println!("\n{}", "Listening for room events (Ctrl+C to leave)...".yellow());
        print_events(&mut read).await;
    }
}

async fn print_events<S>(read: &mut S)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => println!("{} {}", "◀".green(), text.bright_white()),
            Ok(Message::Close(_)) => {
                println!("{} Server closed the connection", "✗".yellow());
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                println!("{} Connection error: {}", "✗".red(), e);
                break;
            }
        }
    }
}

async fn run_validations(server: &str, admin_id: Option<&str>, course_id: Option<&str>) {
    println!("\n{}", "Running validation scenarios".bold().cyan());
    println!("{}", "═".repeat(60).cyan());

    let mut results: Vec<(&str, bool)> = Vec::new();

    print_scenario("health");
    results.push(("health", validate_health(server).await));

    print_scenario("connection");
    results.push(("connection", validate_connection(server).await));

    print_scenario("invalid-room");
    results.push(("invalid-room", validate_invalid_room(server).await));

    match (admin_id, course_id) {
        (Some(admin_id), Some(course_id)) => {
            print_scenario("room-lifecycle");
            results.push((
                "room-lifecycle",
                validate_room_lifecycle(server, admin_id, course_id).await,
            ));
        }
        _ => println!(
            "\n{} room-lifecycle skipped (needs --admin-id and --course-id)",
            "⚠".yellow()
        ),
    }

    println!("\n{}", "═".repeat(60).cyan());
    let passed = results.iter().filter(|(_, ok)| *ok).count();
    for (name, ok) in &results {
        let mark = if *ok { "✓".green() } else { "✗".red() };
        println!("  {} {}", mark, name);
    }
    println!("\n{}/{} scenarios passed", passed, results.len());
}

fn print_scenario(name: &str) {
    println!("\n{} {}", "▶".cyan(), name.bold());
}

async fn validate_health(server: &str) -> bool {
    match get_json(server, "/classroom/health").await {
        Ok(body) if body["status"] == "healthy" => {
            println!("{} Server healthy", "✓".green());
            true
        }
        Ok(body) => {
            println!("{} Unexpected health response: {}", "✗".yellow(), body);
            false
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            false
        }
    }
}

async fn validate_connection(server: &str) -> bool {
    let url = ws_url(server, None, None, Some("validator-guest"));
    match connect_async(&url).await {
        Ok((ws_stream, _)) => {
            let (_, mut read) = ws_stream.split();
            let connected = next_event(&mut read, "connected", 3).await.is_some();
            if connected {
                println!("{} Connected event received", "✓".green());
            } else {
                println!("{} No connected event", "✗".red());
            }
            connected
        }
        Err(e) => {
            println!("{} Connection failed: {}", "✗".red(), e);
            false
        }
    }
}

async fn validate_invalid_room(server: &str) -> bool {
    let url = ws_url(server, None, None, Some("validator-guest"));
    let Ok((ws_stream, _)) = connect_async(&url).await else {
        println!("{} Connection failed", "✗".red());
        return false;
    };
    let (mut write, mut read) = ws_stream.split();

    let msg = frame("join-room", json!({ "roomId": "no-such-room-000" }), Some(7));
    if write.send(msg).await.is_err() {
        return false;
    }

    match next_event(&mut read, "ack", 3).await {
        Some(ack) if ack["data"]["code"] == "RoomNotFound" => {
            println!("{} Join rejected with RoomNotFound", "✓".green());
            true
        }
        Some(ack) => {
            println!("{} Unexpected ack: {}", "✗".yellow(), ack);
            false
        }
        None => {
            println!("{} No ack received", "✗".red());
            false
        }
    }
}

async fn validate_room_lifecycle(server: &str, admin_id: &str, course_id: &str) -> bool {
    let room_id = format!("validate-{}", rand::random::<u32>());

    println!("  Step 1: Instructor creates {}...", room_id);
    let Ok((instructor, _)) = connect_async(&ws_url(server, None, Some(admin_id), None)).await else {
        println!("{} Instructor connection failed", "✗".red());
        return false;
    };
    let (mut iw, mut ir) = instructor.split();
    let msg = frame("create-room", json!({ "roomId": room_id, "courseId": course_id }), Some(1));
    if iw.send(msg).await.is_err() {
        return false;
    }
    match next_event(&mut ir, "ack", 5).await {
        Some(ack) if ack["data"]["status"] == "success" => {
            println!("{} Room created", "✓".green());
        }
        other => {
            println!("{} Create failed: {:?}", "✗".red(), other);
            return false;
        }
    }

    println!("  Step 2: Student joins...");
    let Ok((student, _)) = connect_async(&ws_url(server, None, None, Some("validator-student"))).await
    else {
        println!("{} Student connection failed", "✗".red());
        return false;
    };
    let (mut sw, mut sr) = student.split();
    if sw
        .send(frame("join-room", json!({ "roomId": room_id }), Some(2)))
        .await
        .is_err()
    {
        return false;
    }
    if next_event(&mut ir, "user-joined", 5).await.is_none() {
        println!("{} Instructor did not see user-joined", "✗".red());
        return false;
    }
    println!("{} Instructor notified of join", "✓".green());

    println!("  Step 3: Instructor disconnects...");
    let _ = iw.close().await;
    drop(ir);

    let ended = next_event(&mut sr, "room-ended", 5).await.is_some();
    if ended {
        println!("{} Student received room-ended", "✓".green());
    } else {
        println!("{} Student never received room-ended", "✗".red());
    }
    ended
}

async fn interactive_mode(url: &str) {
    println!("\n{}", "Interactive Mode".bold().green());
    println!("{}", "═".repeat(60).green());
    println!("Type {} for help, {} to quit\n", "help".cyan(), "quit".cyan());

    let (ws_stream, _) = match connect_async(url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return;
        }
    };
    println!("{} Connected to server", "✓".green());

    let (mut write, mut read) = ws_stream.split();

    let receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!("\n{} {}", "◀".green(), text.bright_white());
            }
        }
    });

    loop {
        print!("{} ", "►".cyan());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }

        let input = input.trim();
        match input {
            "" => continue,
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_interactive_help();
                continue;
            }
            _ => {}
        }

        match serde_json::from_str::<Value>(input) {
            Ok(parsed) if parsed["event"].is_string() => {
                if write.send(Message::Text(parsed.to_string())).await.is_ok() {
                    println!("{} Frame sent", "✓".green());
                } else {
                    println!("{} Failed to send frame", "✗".red());
                    break;
                }
            }
            Ok(_) => println!("{} Frames need an \"event\" field", "✗".yellow()),
            Err(_) => println!("{} Invalid JSON. Type 'help' for examples.", "✗".yellow()),
        }
    }

    receive_task.abort();
}

fn print_interactive_help() {
    println!("\n{}", "Interactive Mode Commands".bold());
    println!("{}", "─".repeat(60));
    println!("Send event frames directly to the server. Add \"ack\":<n> for a reply.\n");

    println!("{}", "Example Frames:".bold());
    println!("\n{}:", "Create Room".cyan());
    println!(r#"  {{"event":"create-room","data":{{"roomId":"r1","courseId":"c1"}},"ack":1}}"#);

    println!("\n{}:", "Join Room".cyan());
    println!(r#"  {{"event":"join-room","data":{{"roomId":"r1"}},"ack":2}}"#);

    println!("\n{}:", "Chat".cyan());
    println!(r#"  {{"event":"send-message","data":{{"roomId":"r1","message":"hello"}}}}"#);

    println!("\n{}:", "Raise Hand".cyan());
    println!(r#"  {{"event":"raise-hand","data":"r1"}}"#);

    println!("\n{}:", "Kick Student".cyan());
    println!(r#"  {{"event":"instructor-kick-student","data":{{"roomId":"r1","targetId":"<id>"}}}}"#);

    println!("\n{}:", "Leave".cyan());
    println!(r#"  {{"event":"leave-room","data":"r1"}}"#);

    println!("\n{}: quit, exit", "Commands".bold());
    println!();
}
