use pololu_usb::{list_devices_by_ids, port_names, Connection, LibusbBackend, POLOLU_VID};
use std::io::{self, Write};

// Native USB interface product ids of a few well-known Pololu devices.
// Protocol crates built on top of pololu-usb carry the full tables.
const KNOWN_PRODUCT_IDS: &[u16] = &[
    0x0089, // Micro Maestro 6
    0x008A, // Mini Maestro 12
    0x008B, // Mini Maestro 18
    0x008C, // Mini Maestro 24
    0x00B3, // Jrk G2 21v3
];

fn main() -> pololu_usb::Result<()> {
    env_logger::init();
    let backend = LibusbBackend::new()?;

    println!(
        "Searching for Pololu USB devices (VID=0x{POLOLU_VID:04X}, {} known product ids)...",
        KNOWN_PRODUCT_IDS.len()
    );
    let devices = list_devices_by_ids(&backend, POLOLU_VID, KNOWN_PRODUCT_IDS)?;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for (i, descriptor) in devices.iter().enumerate() {
        println!(
            "  {}: VID=0x{:04X}, PID=0x{:04X}, Serial='{}', Label='{}'",
            i,
            descriptor.vendor_id,
            descriptor.product_id,
            descriptor.serial_number,
            descriptor.display_text,
        );
    }

    let selected = if devices.len() == 1 {
        println!("Automatically selecting the only device found.");
        &devices[0]
    } else {
        loop {
            print!(
                "Enter the number of the device to connect to (0-{}): ",
                devices.len() - 1
            );
            io::stdout().flush().ok();
            let mut input = String::new();
            if io::stdin().read_line(&mut input).is_err() {
                continue;
            }
            match input.trim().parse::<usize>() {
                Ok(index) if index < devices.len() => break &devices[index],
                _ => println!(
                    "Invalid input. Please enter a number between 0 and {}.",
                    devices.len() - 1
                ),
            }
        }
    };

    println!("Connecting to {selected}...");
    let connection = match Connection::open(&backend, selected) {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("Error connecting: {e}");
            return Err(e);
        }
    };

    println!(
        "Connected. Serial='{}', PID=0x{:04X}",
        connection.serial_number(),
        connection.product_id()?
    );

    // Every supported device answers this vendor request with its 2-byte
    // firmware version in BCD (request 0x06 = GET_FIRMWARE_VERSION).
    let mut version = [0u8; 2];
    match connection.control_transfer_data(0xC0, 0x06, 0, 0, &mut version) {
        Ok(2) => println!(
            "Firmware version: {:X}.{:02X}",
            version[1], version[0]
        ),
        Ok(n) => println!("Short firmware version response ({n} bytes)."),
        Err(e) => eprintln!("Error reading firmware version: {e}"),
    }

    connection.disconnect();

    // The Maestros also expose a virtual serial port; show where it landed.
    let ports = port_names(&backend, "USB\\VID_1FFB")?;
    if !ports.is_empty() {
        println!("Serial ports: {}", ports.join(", "));
    }

    Ok(())
}
