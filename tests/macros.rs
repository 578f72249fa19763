use std::rc::Rc;
use treelog::log::{CaptureLog, Captured};
use treelog::Level;

#[treelog::title]
fn assemble() -> treelog::Result<usize> {
    treelog::write(Level::Info, "assembling")?;
    Ok(3)
}

#[treelog::title("linear solve")]
fn solve(tolerance: f64) -> treelog::Result<()> {
    treelog::write(Level::Info, &format!("tolerance {}", tolerance))
}

#[treelog::title]
fn refine(title: String, levels: usize) -> treelog::Result<()> {
    treelog::write(Level::Info, &format!("{} levels", levels))
}

struct Solver;

impl Solver {
    #[treelog::title]
    fn step(&self) -> treelog::Result<()> {
        treelog::write(Level::Debug, "stepping")
    }
}

fn contexts(log: &CaptureLog) -> Vec<String> {
    log.events()
        .into_iter()
        .filter_map(|event| match event {
            Captured::Push(title) => Some(title),
            _ => None,
        })
        .collect()
}

#[test]
fn test_title() -> Result<(), Box<dyn std::error::Error>> {
    let log = Rc::new(CaptureLog::new());
    let _active = treelog::activate(log.clone())?;

    assert!(assemble()? == 3);
    solve(1e-6)?;
    refine("refine 2".to_owned(), 2)?;
    Solver.step()?;

    assert!(contexts(&log) == ["assemble", "linear solve", "refine 2", "step"]);
    assert!(
        log.events()[1]
            == Captured::Item {
                level: Level::Info,
                text: "assembling".to_owned(),
                context: vec!["assemble".to_owned()],
            }
    );

    Ok(())
}

#[treelog::test]
fn test_macro_test() -> treelog::Result<()> {
    treelog::write(Level::Info, "written to the test output")
}

#[treelog::test(fmt = "rich", verbose = "warning")]
fn test_macro_test_rich() {
    let _ctx = treelog::context("rich").unwrap();
    treelog::write(Level::Warning, "painted").unwrap();
}

#[treelog::test]
fn test_macro_test_activates() {
    // Activations nest inside the console log installed by the attribute.
    let log = Rc::new(CaptureLog::new());
    let _active = treelog::activate(log.clone()).unwrap();
    treelog::write(Level::User, "nested").unwrap();
    assert!(log.items() == [(Level::User, "nested".to_owned())]);
}

#[test]
#[should_panic(expected = "reported")]
fn test_macro_test_reports_panics() {
    #[treelog::main]
    fn main() {
        panic!("reported");
    }

    main();
}
