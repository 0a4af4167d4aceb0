use cohort::{
    app::{enter_error_state, App},
    config::AppConfig,
    heartbeat::SimulatedLed,
};
use cohort_port_std::{PortConfig, StdKernel};
use std::{io, sync::Arc, thread};

fn main() {
    env_logger::init();
    log::info!("RTOS START");

    let kernel = Arc::new(StdKernel::new(PortConfig::from_env()));
    let led = Arc::new(SimulatedLed::new());

    let app = match App::bring_up(
        Arc::clone(&kernel),
        AppConfig::DEFAULT,
        io::stdout(),
        led.clone(),
    ) {
        Ok(app) => app,
        Err(e) => {
            log::error!("bring-up failed: {e}");
            enter_error_state(&*led);
        }
    };
    log::trace!("{app:#?}");

    // `COHORT_RUN_TICKS` bounds the run for scripted use
    if let Ok(value) = std::env::var("COHORT_RUN_TICKS") {
        match value.parse::<u32>() {
            Ok(ticks) => {
                let kernel = Arc::clone(&kernel);
                thread::spawn(move || {
                    thread::sleep(kernel.config().tick * ticks);
                    log::info!("run time elapsed, shutting down");
                    kernel.shutdown();
                });
            }
            Err(e) => log::warn!("ignoring COHORT_RUN_TICKS = {value:?}: {e}"),
        }
    }

    kernel.start_scheduler();
}
