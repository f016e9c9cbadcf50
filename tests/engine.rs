//! Run driver integration tests: class registration, the visit contract,
//! sequential and parallel execution, cancellation, and failure routing.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use bytescope::{cache::CacheConfig, prelude::*};

fn simple_body() -> Arc<MethodBody> {
    let mut asm = BodyAssembler::new(1, 2);
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit_push_int(1);
    asm.emit_store(1);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_push_int(2);
    asm.emit_store(1);
    asm.define_label("join").unwrap();
    asm.emit(Opcode::Return);
    Arc::new(asm.finish().unwrap())
}

fn broken_body() -> Arc<MethodBody> {
    // Falls off the end: rejected by the CFG builder.
    let mut asm = BodyAssembler::new(0, 1);
    asm.emit_push_int(1);
    asm.emit_store(0);
    Arc::new(asm.finish().unwrap())
}

fn class_info(name: &str, methods: &[(&str, Arc<MethodBody>)]) -> ClassInfo {
    let descriptor = ClassDescriptor::new(name);
    ClassInfo {
        descriptor: descriptor.clone(),
        super_class: None,
        interfaces: Vec::new(),
        methods: methods
            .iter()
            .map(|(method_name, body)| MethodInfo {
                descriptor: MethodDescriptor::new(&descriptor, method_name, "(I)V", true),
                body: Arc::clone(body),
            })
            .collect(),
    }
}

#[test]
fn visits_every_method_with_working_accessors() {
    let mut run = AnalysisRun::new(CacheConfig::default());
    run.add_class(class_info("pkg/Alpha", &[("a", simple_body()), ("b", simple_body())]));
    run.add_class(class_info("pkg/Beta", &[("c", simple_body())]));

    let visited = Mutex::new(Vec::new());
    run.for_each_method(|ctx| {
        let cfg = ctx.cfg()?;
        assert_eq!(cfg.block_count(), 4);
        let dfs = ctx.depth_first_search()?;
        assert_eq!(dfs.reverse_postorder().first(), Some(&cfg.entry()));
        let _ = ctx.value_numbering()?;
        let _ = ctx.constants()?;
        visited.lock().unwrap().push(ctx.descriptor().clone());
        Ok(())
    })
    .unwrap();

    let visited = visited.into_inner().unwrap();
    assert_eq!(visited.len(), 3);
    // Classes in registration order, methods in descriptor order.
    let names: Vec<&str> = visited.iter().map(MethodDescriptor::name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn visit_class_only_covers_that_class() {
    let mut run = AnalysisRun::new(CacheConfig::default());
    run.add_class(class_info("pkg/Alpha", &[("a", simple_body())]));
    run.add_class(class_info("pkg/Beta", &[("b", simple_body())]));

    let count = AtomicUsize::new(0);
    run.visit_class(&ClassDescriptor::new("pkg/Beta"), |ctx| {
        assert_eq!(ctx.descriptor().class().name(), "pkg/Beta");
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn parallel_execution_shares_the_cache() {
    let mut run = AnalysisRun::new(CacheConfig::default());
    let shared = simple_body();
    for class_index in 0..4 {
        let name = format!("pkg/Par{class_index}");
        run.add_class(class_info(&name, &[("m", Arc::clone(&shared)), ("n", Arc::clone(&shared))]));
    }

    run.par_for_each_method(|ctx| {
        let cfg = ctx.cfg()?;
        let again = ctx.cfg()?;
        assert!(Arc::ptr_eq(&cfg, &again));
        let _ = ctx.nullness()?;
        let _ = ctx.locks()?;
        Ok(())
    })
    .unwrap();
    assert!(run.collector().is_empty());
}

#[test]
fn broken_method_is_reported_once_and_does_not_stop_siblings() {
    let mut run = AnalysisRun::new(CacheConfig::default());
    run.add_class(class_info(
        "pkg/Mixed",
        &[("bad", broken_body()), ("good", simple_body())],
    ));

    let good_visits = AtomicUsize::new(0);
    run.for_each_method(|ctx| {
        let _ = ctx.cfg()?;
        good_visits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    // The good sibling was analyzed; the broken one was recorded once.
    assert_eq!(good_visits.load(Ordering::SeqCst), 1);
    let reports: Vec<String> = run.collector().iter().map(|e| e.to_string()).collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("bad"));

    // Re-visiting replays the memoized failure without a second report.
    run.for_each_method(|ctx| ctx.cfg().map(|_| ())).unwrap();
    assert_eq!(run.collector().len(), 1);
}

#[test]
fn unprofitable_methods_are_skipped_silently() {
    let mut run = AnalysisRun::new(CacheConfig { max_instructions: 4 });
    let mut asm = BodyAssembler::new(0, 1);
    for _ in 0..8 {
        asm.emit_push_int(1);
        asm.emit_store(0);
    }
    asm.emit(Opcode::Return);
    run.add_class(class_info("pkg/Big", &[("huge", Arc::new(asm.finish().unwrap()))]));

    let unprofitable = AtomicUsize::new(0);
    run.for_each_method(|ctx| match ctx.cfg() {
        Err(Error::Unprofitable(_)) => {
            unprofitable.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        other => other.map(|_| ()),
    })
    .unwrap();
    assert_eq!(unprofitable.load(Ordering::SeqCst), 1);
    // Unprofitable is an expected outcome, not an error report.
    assert!(run.collector().is_empty());
}

#[test]
fn cancellation_stops_between_methods() {
    let mut run = AnalysisRun::new(CacheConfig::default());
    run.add_class(class_info(
        "pkg/Cancel",
        &[("a", simple_body()), ("b", simple_body()), ("c", simple_body())],
    ));

    let visited = AtomicUsize::new(0);
    run.for_each_method(|_ctx| {
        visited.fetch_add(1, Ordering::SeqCst);
        run.cancel();
        Ok(())
    })
    .unwrap();
    assert_eq!(visited.load(Ordering::SeqCst), 1);
    assert!(run.is_cancelled());
}

#[test]
fn descriptor_pool_deduplicates_across_callers() {
    let run = AnalysisRun::new(CacheConfig::default());
    let pool = run.pool();
    let a = pool.class("pkg/Shared");
    let b = pool.class("pkg/Shared");
    assert_eq!(a, b);
    assert_eq!(pool.class_count(), 1);
}
