#![no_std]
#![no_main]

use cec_initiator::dispatch::{Port, Transport};
use cec_initiator::rp::{EmbassyClock, FlexCecLine};
use cec_initiator::{Activity, CecTransmitter, Indicator, Initiator, InitiatorConfig};
use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Flex, Level, Output};
use embassy_rp::peripherals::{UART1, USB};
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use embassy_time::{Delay, Duration, Ticker};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::Driver as UsbDriverTrait;
use embassy_usb::{Builder, UsbDevice};
use embedded_hal::delay::DelayNs;
use embedded_io_async::{Read, Write};
use heapless::String;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

// Board wiring: CEC on GPIO20, status LED on GPIO25, companion UART1 on GPIO4/5.
const COMPANION_BAUD: u32 = 115_200;
const USB_VID: u16 = 0xc0de;
const USB_PID: u16 = 0xcec0;
const USB_PACKET_SIZE: u16 = 64;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const BLINK_HALF_PERIOD_MS: u32 = 100;
const HEARTBEAT_FLASH_MS: u32 = 10;
const STARTUP_BLINKS: u8 = 5;
const STARTUP_HALF_PERIOD_MS: u32 = 200;

/// Echo, replies and prompt produced by one received chunk.
const REPLY_CAPACITY: usize = 1024;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
});

static UART_TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static UART_RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

type UsbDriver = Driver<'static, USB>;

/// Status LED. Blinks block, so they finish before the frame goes out.
struct LedIndicator {
    led: Output<'static>,
    delay: Delay,
}

impl LedIndicator {
    fn new(led: Output<'static>) -> Self {
        Self { led, delay: Delay }
    }

    fn blink(&mut self, count: u8, half_period_ms: u32) {
        for _ in 0..count {
            self.led.set_high();
            self.delay.delay_ms(half_period_ms);
            self.led.set_low();
            self.delay.delay_ms(half_period_ms);
        }
    }

    fn heartbeat(&mut self) {
        self.led.set_high();
        self.delay.delay_ms(HEARTBEAT_FLASH_MS);
        self.led.set_low();
    }
}

impl Indicator for LedIndicator {
    fn signal(&mut self, activity: Activity) {
        trace!("LED {}", activity);
        self.blink(activity.blink_count(), BLINK_HALF_PERIOD_MS);
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Next packet from the console, waiting out disconnects.
async fn console_read<'d, D: UsbDriverTrait<'d>>(
    class: &mut CdcAcmClass<'d, D>,
    buf: &mut [u8],
) -> usize {
    loop {
        class.wait_connection().await;
        match class.read_packet(buf).await {
            Ok(n) => return n,
            Err(_) => continue,
        }
    }
}

async fn console_write<'d, D: UsbDriverTrait<'d>>(class: &mut CdcAcmClass<'d, D>, bytes: &[u8]) {
    for chunk in bytes.chunks(USB_PACKET_SIZE as usize) {
        if class.write_packet(chunk).await.is_err() {
            warn!("Console disconnected, reply dropped");
            return;
        }
    }
    // A full last packet needs a zero-length packet to end the transfer.
    if !bytes.is_empty() && bytes.len() % USB_PACKET_SIZE as usize == 0 {
        if class.write_packet(&[]).await.is_err() {
            warn!("Console disconnected, reply end dropped");
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let config = InitiatorConfig::default();
    info!("CEC initiator {} starting", config.firmware_id);

    let mut led = LedIndicator::new(Output::new(p.PIN_25, Level::Low));
    led.blink(STARTUP_BLINKS, STARTUP_HALF_PERIOD_MS);

    let cec_line = FlexCecLine::new(Flex::new(p.PIN_20));
    let mut initiator = Initiator::new(CecTransmitter::new(cec_line, Delay), EmbassyClock, config)
        .with_indicator(led);
    info!(
        "CEC on GPIO20, logical address {}",
        initiator.local_address().0
    );

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = COMPANION_BAUD;
    let tx_buf = UART_TX_BUF.init([0u8; 256]);
    let rx_buf = UART_RX_BUF.init([0u8; 256]);
    let uart = Uart::new_blocking(p.UART1, p.PIN_4, p.PIN_5, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (mut uart_tx, mut uart_rx) = uart.split();
    info!("Companion UART TX=GPIO4 RX=GPIO5 at {} baud", COMPANION_BAUD);

    let driver = Driver::new(p.USB, Irqs);
    let mut usb_config = embassy_usb::Config::new(USB_VID, USB_PID);
    usb_config.manufacturer = Some("cec-initiator");
    usb_config.product = Some("CEC initiator console");
    usb_config.serial_number = Some("00000001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = USB_PACKET_SIZE as u8;

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUF.init([0; 64]),
    );
    let mut class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), USB_PACKET_SIZE);
    let usb = builder.build();
    spawner.spawn(usb_task(usb)).unwrap();

    let mut console = Port::new(Transport::Console);
    let mut companion = Port::new(Transport::Companion);
    if let Some(ready) = companion.transport().ready_line() {
        if let Err(e) = uart_tx.write_all(ready.as_bytes()).await {
            warn!("UART write error: {:?}", e);
        }
    }

    info!("Ready for commands");
    let mut usb_buf = [0u8; USB_PACKET_SIZE as usize];
    let mut uart_buf = [0u8; 64];
    let mut heartbeat = Ticker::every(HEARTBEAT_INTERVAL);
    loop {
        let received = select3(
            console_read(&mut class, &mut usb_buf),
            uart_rx.read(&mut uart_buf),
            heartbeat.next(),
        )
        .await;

        let mut reply = String::<REPLY_CAPACITY>::new();
        match received {
            Either3::First(n) => {
                if console.receive(&usb_buf[..n], &mut initiator, &mut reply).is_err() {
                    warn!("Console reply truncated");
                }
                console_write(&mut class, reply.as_bytes()).await;
            }
            Either3::Second(Ok(n)) => {
                if companion.receive(&uart_buf[..n], &mut initiator, &mut reply).is_err() {
                    warn!("Companion reply truncated");
                }
                if let Err(e) = uart_tx.write_all(reply.as_bytes()).await {
                    warn!("UART write error: {:?}", e);
                }
            }
            Either3::Second(Err(e)) => {
                warn!("UART read error: {:?}", e);
            }
            Either3::Third(()) => initiator.indicator_mut().heartbeat(),
        }
    }
}
