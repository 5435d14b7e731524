#![cfg_attr(not(target_os = "macos"), allow(dead_code))]

mod poller;
mod state;
#[cfg(target_os = "macos")]
mod tray;

use tracing_subscriber::EnvFilter;

#[cfg(target_os = "macos")]
fn main() {
    use battery_saver_core::history::HistoryStore;
    use battery_saver_core::{ConfigStore, Escalation, Monitor, OsaNotifier, SystemShell};
    use tao::{
        event::{Event, StartCause},
        event_loop::{ControlFlow, EventLoopBuilder},
    };
    use tracing::{info, warn};
    use tray_icon::{menu::MenuEvent, TrayIcon, TrayIconEvent};

    use crate::poller::{Command, PollerEvent};
    use crate::state::TrayState;

    enum UserEvent {
        TrayIcon(TrayIconEvent),
        Menu(MenuEvent),
        Poller(PollerEvent),
    }

    init_tracing();
    info!("battery-saver-tray starting");

    let store = ConfigStore::resolve();
    let mut app_state = TrayState::new(store.load());
    info!(config = %store.path().display(), "config loaded");

    let mut event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();

    // No Dock icon; must be set before run().
    {
        use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};
        event_loop.set_activation_policy(ActivationPolicy::Accessory);
    }

    let proxy = event_loop.create_proxy();
    TrayIconEvent::set_event_handler(Some(move |event| {
        let _ = proxy.send_event(UserEvent::TrayIcon(event));
    }));

    let proxy = event_loop.create_proxy();
    MenuEvent::set_event_handler(Some(move |event| {
        let _ = proxy.send_event(UserEvent::Menu(event));
    }));

    let monitor = Monitor::new(
        SystemShell,
        OsaNotifier::new(SystemShell),
        store,
        Escalation::Prompt,
    )
    .with_history(HistoryStore::open(HistoryStore::default_path()));

    let proxy = event_loop.create_proxy();
    let dialogs = OsaNotifier::new(SystemShell);
    let (commands, poller_thread) = poller::spawn(monitor, dialogs, move |event| {
        let _ = proxy.send_event(UserEvent::Poller(event));
    });
    let mut poller_thread = Some(poller_thread);

    let (menu, mut menu_items) = tray::build_menu(&app_state);

    // The tray icon must be created inside the event loop (after Init)
    let mut tray_icon: Option<TrayIcon> = None;

    event_loop.run(move |event, _target, control_flow| {
        *control_flow = ControlFlow::Wait;

        let mut quit = false;
        match event {
            Event::NewEvents(StartCause::Init) => {
                tray_icon = tray::build_tray(menu.clone(), &app_state);
                info!("tray icon created");

                // Wake the run loop so the icon appears
                if let Some(rl) = objc2_core_foundation::CFRunLoop::main() {
                    rl.wake_up();
                }
            }

            Event::UserEvent(UserEvent::Poller(PollerEvent::Report(report))) => {
                if app_state.apply(report) {
                    tray::rebuild_thresholds(&mut menu_items, &app_state);
                }
                tray::sync_menu(&menu_items, &app_state);
                if let Some(ref ti) = tray_icon {
                    tray::update_tray(ti, &app_state);
                }
            }

            Event::UserEvent(UserEvent::Poller(PollerEvent::Quit)) => quit = true,

            Event::UserEvent(UserEvent::Menu(event)) => {
                if event.id() == menu_items.quit_item.id() {
                    info!("quit requested");
                    quit = true;
                } else if let Some(cmd) = tray::command_for(&menu_items, event.id()) {
                    if commands.send(cmd).is_err() {
                        warn!(?cmd, "poller is gone");
                    }
                }
            }

            Event::UserEvent(UserEvent::TrayIcon(_)) => {}

            _ => {}
        }

        if quit {
            let _ = commands.send(Command::Shutdown);
            if let Some(handle) = poller_thread.take() {
                let _ = handle.join();
            }
            tray_icon.take();
            *control_flow = ControlFlow::Exit;
        }
    });
}

#[cfg(not(target_os = "macos"))]
fn main() {
    init_tracing();
    tracing::error!("battery-saver-tray drives macOS Low Power Mode and only runs on macOS");
    std::process::exit(1);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
