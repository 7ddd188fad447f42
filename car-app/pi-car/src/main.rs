//! REST control server for the L298N Raspberry Pi car.

mod gpio;
mod pins;

use std::{
    net::{IpAddr, SocketAddr},
    process::ExitCode,
    sync::PoisonError,
};

use car_core::utils::{Car, CarError, SharedCar, serve};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version, about = "REST control server for the L298N Raspberry Pi car")]
struct Opts {
    /// Address to listen on
    #[clap(long, default_value = "0.0.0.0")]
    host: IpAddr,
    /// TCP port
    #[clap(long, default_value_t = 5000)]
    port: u16,
    /// Software PWM frequency on ENA/ENB, in Hz
    #[clap(long, default_value_t = pins::PWM_FREQUENCY_HZ)]
    pwm_frequency: f64,
    /// log pin writes instead of driving the GPIO header
    #[clap(long)]
    simulate: bool,
}

fn build_car(opts: &Opts) -> Result<Car, CarError> {
    if opts.simulate {
        let (left, right) = gpio::simulated();
        Car::new(left, right)
    } else {
        let (left, right) = gpio::open_board(opts.pwm_frequency)?;
        Car::new(left, right)
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => info!("interrupt received"),
        () = terminate => info!("terminate received"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let opts = Opts::parse();

    info!("Raspberry Pi Car Controller starting");
    let car: SharedCar = match build_car(&opts) {
        Ok(car) => car.into_shared(),
        Err(error) => {
            error!(%error, "motor driver initialisation failed");
            return ExitCode::FAILURE;
        }
    };

    let addr = SocketAddr::new(opts.host, opts.port);
    let served = tokio::select! {
        result = serve(addr, car.clone()) => result,
        () = shutdown_signal() => Ok(()),
    };

    // Also runs from `Car`'s Drop if we unwind before reaching this point.
    let stopped = car
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .shutdown();

    let mut code = ExitCode::SUCCESS;
    if let Err(error) = served {
        error!(%error, "server stopped");
        code = ExitCode::FAILURE;
    }
    if let Err(error) = stopped {
        error!(%error, "shutdown incomplete");
        code = ExitCode::FAILURE;
    }
    info!("Raspberry Pi Car Controller stopped");
    code
}
