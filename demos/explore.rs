//! This example explores nearby BLE devices and prints the device tree
//! every time it changes.

use blexplorer::{Error, Explorer, ExplorerConfig, RegistryConfig, Snapshot};
use futures::StreamExt;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    // Give peripherals that went away a second chance when they show up again
    let config = ExplorerConfig::default()
        .registry(RegistryConfig::default().reconnect_on_rediscovery());

    let mut explorer = Explorer::new(config);

    // Create a stream that is provided with a snapshot after every change
    let mut change_stream = explorer.change_stream();

    explorer.start().await?;

    // Redraw in a separate task
    let join_handle = tokio::spawn(async move {
        while let Some(snapshot) = change_stream.next().await {
            render(&snapshot);
        }
    });

    sleep(Duration::from_secs(30)).await;

    explorer.stop().await?;

    join_handle.await.unwrap();

    Ok(())
}

fn render(snapshot: &Snapshot) {
    println!("== {}", snapshot.radio_state());

    for device in snapshot.devices() {
        println!("{}", device.name().unwrap_or("<unnamed>"));
        println!("  {}", device.state());
        println!("  {}", device.id());

        for service in device.services() {
            println!("  Service: {}", service.name());
            for characteristic in service.characteristics() {
                println!("    {}", characteristic.name());
            }
        }
    }
}
