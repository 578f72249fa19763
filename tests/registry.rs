use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use treelog::log::CaptureLog;
use treelog::{Error, Level};

#[test]
fn test_activations_nest() -> Result<(), Box<dyn std::error::Error>> {
    let outer = Rc::new(CaptureLog::new());
    let inner = Rc::new(CaptureLog::new());

    let _outer = treelog::activate(outer.clone())?;
    treelog::write(Level::User, "first")?;
    {
        let _inner = treelog::activate(inner.clone())?;
        treelog::write(Level::User, "second")?;
    }
    treelog::write(Level::User, "third")?;

    assert!(outer.items() == [(Level::User, "first".to_owned()), (Level::User, "third".to_owned())]);
    assert!(inner.items() == [(Level::User, "second".to_owned())]);

    Ok(())
}

#[test]
fn test_reentrancy_keeps_active_log() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let other = Rc::new(CaptureLog::new());

    let _active = treelog::activate(log.clone())?;
    let _other = treelog::activate(other.clone())?;
    let err = treelog::activate(log.clone()).unwrap_err();
    assert!(matches!(err, Error::Reentrancy(_)));

    treelog::write(Level::Info, "still here")?;
    assert!(other.items() == [(Level::Info, "still here".to_owned())]);
    assert!(log.items().is_empty());

    Ok(())
}

#[test]
fn test_release() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());

    treelog::activate(log.clone())?.release()?;
    treelog::write(Level::Info, "not captured")?;
    // Released logs can be activated again.
    treelog::activate(log.clone())?.release()?;

    assert!(log.items().is_empty());
    assert!(Rc::strong_count(&log) == 1);

    Ok(())
}

#[test]
fn test_panic_post_mortem() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let activation = treelog::activate(log.clone())?;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        activation.in_closure(|| panic!("diverged"));
    }));
    assert!(result.is_err());
    drop(activation);

    // Reported once, not again when the activation is dropped.
    let items = log.items();
    assert!(items.len() == 1);
    assert!(items[0].0 == Level::Error);
    assert!(items[0].1.starts_with("panicked: diverged"));

    Ok(())
}

#[inline(never)]
fn factorize_singular_matrix() {
    panic!("zero pivot");
}

#[test]
fn test_panic_post_mortem_has_fault_site() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let activation = treelog::activate(log.clone())?;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        activation.in_closure(factorize_singular_matrix);
    }));
    assert!(result.is_err());

    let items = log.items();
    assert!(items.len() == 1);
    // The location of the panic follows the message, and the stack starts
    // where the panic was raised, not where it was caught.
    assert!(items[0].1.starts_with("panicked: zero pivot, "));
    assert!(items[0].1.contains("tests/registry.rs"));
    let first_frame = items[0]
        .1
        .lines()
        .find(|line| line.starts_with("  File "))
        .unwrap_or_default();
    assert!(first_frame.ends_with("factorize_singular_matrix"));

    Ok(())
}

#[test]
fn test_interrupt() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let activation = treelog::activate(log.clone())?;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        activation.in_closure(|| {
            treelog::interrupt();
        });
    }));
    let payload = result.unwrap_err();
    assert!(payload.is::<treelog::Interrupted>());

    assert!(log.items() == [(Level::Error, "killed by user".to_owned())]);

    Ok(())
}

#[test]
fn test_error_post_mortem() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let activation = treelog::activate(log.clone())?;

    let result = activation.in_result(|| -> Result<u32, io::Error> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no mesh"))
    });
    assert!(result.is_err());

    let items = log.items();
    assert!(items.len() == 1);
    assert!(items[0].0 == Level::Error);
    assert!(items[0].1.starts_with("no mesh"));

    assert!(activation.in_result(|| -> Result<u32, io::Error> { Ok(7) })? == 7);
    assert!(log.items().len() == 1);

    Ok(())
}

#[test]
fn test_unhandled_panic() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _active = treelog::activate(log.clone()).unwrap();
        panic!("bypassed");
    }));
    assert!(result.is_err());

    let items = log.items();
    assert!(items.len() == 1);
    assert!(items[0].0 == Level::Error);
    assert!(items[0].1.starts_with("unhandled panic"));

    Ok(())
}

#[test]
fn test_default_log() -> Result<(), Box<dyn std::error::Error>> {
    // Without an activation, messages go to a console log.
    treelog::write(Level::Debug, "nobody is listening")?;
    let _ctx = treelog::context("default")?;

    Ok(())
}
