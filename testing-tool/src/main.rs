use anyhow::{anyhow, Context, Result};
use colored::*;
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", "🚌 Trip Tracking - Simulador de conductor".bright_blue().bold());
    println!("{}", "=========================================".bright_blue());
    println!();

    // Paso 1: Pedir conexión
    let session = get_session()?;

    // Paso 2: Menú principal
    loop {
        println!();
        println!("{}", "📋 MENÚ PRINCIPAL".bright_green().bold());
        println!("{}", "==================".bright_green());
        println!("1. 📄 Listar trayectos");
        println!("2. 📝 Programar trayecto");
        println!("3. 🚌 Iniciar trayecto");
        println!("4. 📍 Simular recorrido (posiciones en línea recta)");
        println!("5. 🏁 Finalizar trayecto");
        println!("6. 🗺️ Ver posiciones activas");
        println!("7. ⏰ Ver trayectos atrasados");
        println!("8. 🚪 Salir");
        let choice = prompt("Selecciona una opción (1-8): ")?;

        let result = match choice.as_str() {
            "1" => list_trips(&session).await,
            "2" => create_trip(&session).await,
            "3" => start_trip(&session).await,
            "4" => simulate_route(&session).await,
            "5" => finish_trip(&session).await,
            "6" => show(&session, "/trayectos/ubicaciones", "🗺️ POSICIONES ACTIVAS").await,
            "7" => show(&session, "/trayectos/atrasados", "⏰ TRAYECTOS ATRASADOS").await,
            "8" => {
                println!("{}", "👋 ¡Hasta luego!".bright_green());
                break;
            }
            _ => {
                println!("{}", "❌ Opción inválida. Intenta de nuevo.".bright_red());
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{}", format!("❌ {}", e).bright_red());
        }
    }

    Ok(())
}

struct Session {
    client: Client,
    base_url: String,
    token: String,
}

impl Session {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        read_json(request.send().await?).await
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("sin detalle");
        return Err(anyhow!("HTTP {}: {}", status, message));
    }
    Ok(body)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label.bright_yellow());
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn prompt_number<T: std::str::FromStr>(label: &str) -> Result<T> {
    prompt(label)?
        .parse()
        .map_err(|_| anyhow!("Valor numérico inválido"))
}

fn get_session() -> Result<Session> {
    println!("{}", "🔐 CONEXIÓN AL BACKEND".bright_cyan().bold());
    println!("{}", "======================".bright_cyan());

    let base_url = std::env::var("BACKEND_URL").or_else(|_| prompt("URL del backend (http://localhost:3000): "))?;
    let base_url = if base_url.is_empty() {
        "http://localhost:3000".to_string()
    } else {
        base_url.trim_end_matches('/').to_string()
    };
    let token = std::env::var("TRACKING_TOKEN").or_else(|_| prompt("Token JWT: "))?;

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("No se pudo crear el cliente HTTP")?;

    Ok(Session {
        client,
        base_url,
        token,
    })
}

async fn list_trips(session: &Session) -> Result<()> {
    let trips = session.call(Method::GET, "/trayectos", None).await?;
    println!();
    println!("{}", "📄 TRAYECTOS".bright_cyan().bold());
    for trip in trips.as_array().into_iter().flatten() {
        let estado = trip["estado"].as_str().unwrap_or("?");
        let estado = match estado {
            "en_curso" => estado.bright_green(),
            "completado" => estado.bright_blue(),
            "cancelado" => estado.bright_red(),
            _ => estado.bright_yellow(),
        };
        println!(
            "  #{} conductor {} ruta {} - {}",
            trip["id"], trip["conductor_id"], trip["nombre_ruta"].as_str().unwrap_or("-"), estado
        );
    }
    Ok(())
}

async fn create_trip(session: &Session) -> Result<()> {
    let ruta_id: i64 = prompt_number("Ruta ID: ")?;
    let conductor_id: i64 = prompt_number("Conductor ID: ")?;
    let vehiculo_id: i64 = prompt_number("Vehículo ID: ")?;
    let minutos: u32 = prompt_number("Duración estimada (min): ")?;

    let response = session
        .call(
            Method::POST,
            "/trayectos",
            Some(json!({
                "ruta_id": ruta_id,
                "conductor_id": conductor_id,
                "vehiculo_id": vehiculo_id,
                "duracion_estimada_minutos": minutos
            })),
        )
        .await?;
    println!("{}", format!("✅ Trayecto #{} programado", response["data"]["id"]).bright_green());
    Ok(())
}

async fn start_trip(session: &Session) -> Result<()> {
    let id: i64 = prompt_number("Trayecto ID: ")?;
    session
        .call(Method::POST, &format!("/trayectos/{}/iniciar", id), None)
        .await?;
    println!("{}", format!("✅ Trayecto #{} en curso", id).bright_green());
    Ok(())
}

async fn finish_trip(session: &Session) -> Result<()> {
    let id: i64 = prompt_number("Trayecto ID: ")?;
    let pasajeros: i64 = prompt_number("Cantidad de pasajeros: ")?;
    let response = session
        .call(
            Method::POST,
            &format!("/trayectos/{}/finalizar", id),
            Some(json!({ "cantidad_pasajeros": pasajeros })),
        )
        .await?;
    println!(
        "{}",
        format!(
            "✅ Trayecto #{} finalizado en {} min",
            id, response["data"]["duracion_minutos"]
        )
        .bright_green()
    );
    Ok(())
}

/// Envía `pasos` posiciones interpoladas entre dos puntos
async fn simulate_route(session: &Session) -> Result<()> {
    let conductor_id: i64 = prompt_number("Conductor ID: ")?;
    let from_lat: f64 = prompt_number("Latitud inicial (ej: 5.07): ")?;
    let from_lng: f64 = prompt_number("Longitud inicial (ej: -75.51): ")?;
    let to_lat: f64 = prompt_number("Latitud final (ej: 5.08): ")?;
    let to_lng: f64 = prompt_number("Longitud final (ej: -75.52): ")?;
    let steps: u32 = prompt_number("Pasos: ")?;
    let every: u64 = prompt_number("Segundos entre reportes: ")?;

    println!();
    println!("{}", "📍 SIMULANDO RECORRIDO...".bright_cyan().bold());
    let steps = steps.max(1);
    for step in 0..=steps {
        let fraction = f64::from(step) / f64::from(steps);
        let lat = from_lat + (to_lat - from_lat) * fraction;
        let lng = from_lng + (to_lng - from_lng) * fraction;

        match session
            .call(
                Method::POST,
                "/trayectos/ubicacion",
                Some(json!({ "conductor_id": conductor_id, "lat": lat, "lng": lng })),
            )
            .await
        {
            Ok(_) => println!("  {} {:.5}, {:.5}", "✔".bright_green(), lat, lng),
            // Igual que el dispositivo: la muestra se pierde y se sigue
            Err(e) => println!("  {} {:.5}, {:.5} ({})", "✘".bright_red(), lat, lng, e),
        }

        if step < steps {
            tokio::time::sleep(Duration::from_secs(every)).await;
        }
    }
    println!("{}", "✅ Recorrido enviado".bright_green());
    Ok(())
}

async fn show(session: &Session, path: &str, title: &str) -> Result<()> {
    let body = session.call(Method::GET, path, None).await?;
    println!();
    println!("{}", title.bright_cyan().bold());
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
