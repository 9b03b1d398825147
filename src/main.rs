use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};

use trip_tracking::api::create_api_router;
use trip_tracking::config::EnvironmentConfig;
use trip_tracking::middleware::cors::cors_for;
use trip_tracking::services::overdue_monitor::OverdueMonitor;
use trip_tracking::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();
    let config = EnvironmentConfig::from_env()?;

    // Configurar logging
    let level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("🚌 Trip Tracking - Seguimiento de trayectos en vivo");
    info!("================================================");

    if config.is_production() && config.jwt_secret == EnvironmentConfig::default().jwt_secret {
        warn!("⚠️ JWT_SECRET por defecto en producción");
    }

    let app_state = AppState::new(config.clone());
    let engine = Arc::clone(&app_state.engine);

    // Monitor de atrasos en segundo plano
    let overdue_monitor = OverdueMonitor::spawn(Arc::clone(&engine), config.tracking.poll_interval());

    let app = create_api_router(app_state).layer(cors_for(&config.cors_origins, config.is_development()));

    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("🛣️ Trayectos:");
    info!("   GET  /trayectos - Listar trayectos (estado, conductor_id, ruta_id)");
    info!("   POST /trayectos - Programar trayecto");
    info!("   GET  /trayectos/:id - Obtener trayecto");
    info!("   DELETE /trayectos/:id - Eliminar trayecto");
    info!("   POST /trayectos/:id/iniciar - Iniciar trayecto");
    info!("   POST /trayectos/:id/finalizar - Finalizar trayecto");
    info!("   POST /trayectos/:id/cancelar - Cancelar trayecto");
    info!("   GET  /trayectos/:id/progreso - Progreso y ETA");
    info!("   GET  /trayectos/atrasados - Trayectos atrasados");
    info!("📍 Ubicaciones:");
    info!("   POST /trayectos/ubicacion - Reportar ubicación");
    info!("   GET  /trayectos/ubicaciones - Posiciones activas (ruta_id)");
    info!("   GET  /trayectos/ubicaciones/stream - Stream SSE");
    info!("   GET  /trayectos/ubicaciones/:conductor_id/recorrido - Recorrido");
    info!("🚨 Novedades:");
    info!("   POST /novedades - Reportar novedad");
    info!("   GET  /novedades - Listar novedades");
    info!("   GET  /novedades/stats - Estadísticas");
    info!("🗺️ Rutas y tablero:");
    info!("   GET  /rutas - Listar rutas");
    info!("   POST /rutas - Guardar ruta");
    info!("   GET  /dashboard/resumen - Resumen de flota");
    info!("   GET  /dashboard/snapshot - Snapshot del tablero");

    // Iniciar servidor en background
    let server_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("❌ Error del servidor: {}", e);
                e
            })
    });

    // Esperar a que el servidor termine
    if let Err(e) = server_handle.await? {
        error!("❌ Servidor terminó con error: {}", e);
    }

    overdue_monitor.stop();
    engine.animation().shutdown();

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
