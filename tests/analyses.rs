//! Concrete analysis integration tests, driven through the cache so the
//! declared dependency chains (nullness and locks on value numbering,
//! typeflow on the hierarchy) are exercised the way detectors exercise them.

use std::sync::Arc;

use bytescope::{
    analysis::Location,
    cache::{register_default_engines, AnalysisCache, CacheConfig},
    prelude::*,
};

fn method(name: &str, is_static: bool) -> MethodDescriptor {
    MethodDescriptor::new(&ClassDescriptor::new("pkg/Subject"), name, "()V", is_static)
}

fn cache_with(methods: &[(MethodDescriptor, MethodBody)]) -> AnalysisCache {
    let mut cache = AnalysisCache::new(CacheConfig::default());
    register_default_engines(&mut cache);
    for (descriptor, body) in methods {
        cache.add_method_body(descriptor.clone(), Arc::new(body.clone()));
    }
    cache
}

#[test]
fn balanced_double_lock_is_zero_at_exit() {
    // synchronized(arg0) {} twice in sequence.
    let m = method("locker", false);
    let mut asm = BodyAssembler::new(1, 1);
    for _ in 0..2 {
        asm.emit_load(0);
        asm.emit(Opcode::MonitorEnter);
        asm.emit_load(0);
        asm.emit(Opcode::MonitorExit);
    }
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let locks = cache.get_method::<LockDataflow>(&m).unwrap();
    let at_exit = locks.at_exit(&cfg).unwrap();
    assert!(!at_exit.is_conflict());
    assert_eq!(at_exit.total_held(), 0);
}

#[test]
fn reentrant_lock_counts_to_two_between_acquisitions() {
    let m = method("nested", false);
    let mut asm = BodyAssembler::new(1, 1);
    asm.emit_load(0);
    asm.emit(Opcode::MonitorEnter);
    asm.emit_load(0);
    asm.emit(Opcode::MonitorEnter);
    asm.emit_load(0);
    asm.emit(Opcode::MonitorExit);
    asm.emit_load(0);
    asm.emit(Opcode::MonitorExit);
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let vna = cache.get_method::<ValueNumbering>(&m).unwrap();
    let locks = cache.get_method::<LockDataflow>(&m).unwrap();

    // Between the two acquisitions (before the first MonitorExit at index 5)
    // the monitor of arg0 is held twice - and both enters resolved to the
    // same value number.
    let entry = cfg.entry();
    let monitor = vna
        .value_before(&cfg, Location { node: entry, index: 1 }, 0)
        .unwrap()
        .unwrap();
    let second_monitor = vna
        .value_before(&cfg, Location { node: entry, index: 3 }, 0)
        .unwrap()
        .unwrap();
    assert_eq!(monitor, second_monitor);

    let mid = locks
        .dataflow()
        .fact_before_instruction(
            &mut bytescope::analysis::LockAnalysis::new(Arc::clone(&cfg), Arc::clone(&vna)),
            &cfg,
            Location { node: entry, index: 5 },
        )
        .unwrap()
        .unwrap();
    assert_eq!(mid.count(monitor), 2);
}

#[test]
fn null_test_refines_both_branches() {
    // if (arg0 == null) { <here arg0 is Null> } else { <here NonNull> }
    let m = method("nullcheck", false);
    let mut asm = BodyAssembler::new(1, 1);
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfNull, "isnull");
    asm.emit(Opcode::Nop);
    asm.emit(Opcode::Return);
    asm.define_label("isnull").unwrap();
    asm.emit(Opcode::Nop);
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let nullness = cache.get_method::<NullnessDataflow>(&m).unwrap();

    let mut null_branch = None;
    let mut nonnull_branch = None;
    for (_, target, edge) in cfg.outgoing(cfg.entry()) {
        match edge.kind {
            CfgEdgeKind::BranchTaken => null_branch = Some(target),
            CfgEdgeKind::BranchNotTaken => nonnull_branch = Some(target),
            _ => {}
        }
    }
    assert_eq!(
        nullness.local_at_entry(null_branch.unwrap(), 0),
        Some(Nullness::Null)
    );
    assert_eq!(
        nullness.local_at_entry(nonnull_branch.unwrap(), 0),
        Some(Nullness::NonNull)
    );
}

#[test]
fn merged_paths_report_null_on_some_path() {
    // if (cond) x = null else x = new Widget(); at the join x may be null.
    let m = method("mixed", false);
    let widget = ClassDescriptor::new("pkg/Widget");
    let mut asm = BodyAssembler::new(2, 2);
    asm.emit_load(1);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit(Opcode::ConstNull);
    asm.emit_store(0);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_class(Opcode::New, widget);
    asm.emit_store(0);
    asm.define_label("join").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let nullness = cache.get_method::<NullnessDataflow>(&m).unwrap();
    let join = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();
    assert_eq!(
        nullness.local_at_entry(join, 0),
        Some(Nullness::NullOnSomePath)
    );
}

#[test]
fn value_numbering_unifies_lock_expressions_across_field_loads() {
    let m = method("fieldlock", false);
    let lock_field = FieldRef {
        class: ClassDescriptor::new("pkg/Subject"),
        name: "mutex".to_string(),
        value_class: Some(ClassDescriptor::new("lang/Object")),
    };
    let mut asm = BodyAssembler::new(1, 1);
    asm.emit_load(0);
    asm.emit_field(Opcode::GetField, lock_field.clone());
    asm.emit(Opcode::MonitorEnter);
    asm.emit_load(0);
    asm.emit_field(Opcode::GetField, lock_field);
    asm.emit(Opcode::MonitorExit);
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let locks = cache.get_method::<LockDataflow>(&m).unwrap();
    // Balanced because both loads of this.mutex share one value number.
    let at_exit = locks.at_exit(&cfg).unwrap();
    assert_eq!(at_exit.total_held(), 0);
    assert!(!at_exit.is_conflict());
}

#[test]
fn typeflow_joins_to_common_supertype() {
    let m = method("shapes", false);
    let circle = ClassDescriptor::new("pkg/Circle");
    let square = ClassDescriptor::new("pkg/Square");
    let shape = ClassDescriptor::new("pkg/Shape");

    let mut asm = BodyAssembler::new(2, 2);
    asm.emit_load(1);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit_class(Opcode::New, circle.clone());
    asm.emit_store(0);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_class(Opcode::New, square.clone());
    asm.emit_store(0);
    asm.define_label("join").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();

    let cache = cache_with(&[(m.clone(), body)]);
    let hierarchy = cache.hierarchy();
    hierarchy.add_class(ClassDescriptor::new("pkg/Subject"), None, Vec::new());
    hierarchy.add_class(shape.clone(), None, Vec::new());
    hierarchy.add_class(circle, Some(shape.clone()), Vec::new());
    hierarchy.add_class(square, Some(shape.clone()), Vec::new());

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let types = cache.get_method::<TypeDataflow>(&m).unwrap();
    let join = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();
    let fact = types.dataflow().entry_fact(join).unwrap();
    assert_eq!(fact.local(0), Some(&TypeFact::Object(shape)));
}

#[test]
fn typeflow_degrades_on_missing_classes_and_reports_once() {
    let m = method("ghostly", false);
    let ghost_a = ClassDescriptor::new("ghost/Alpha");
    let ghost_b = ClassDescriptor::new("ghost/Beta");

    let mut asm = BodyAssembler::new(2, 2);
    asm.emit_load(1);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit_class(Opcode::New, ghost_a.clone());
    asm.emit_store(0);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_class(Opcode::New, ghost_b);
    asm.emit_store(0);
    asm.define_label("join").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();

    let cache = cache_with(&[(m.clone(), body)]);
    cache
        .hierarchy()
        .add_class(ClassDescriptor::new("pkg/Subject"), None, Vec::new());

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let types = cache.get_method::<TypeDataflow>(&m).unwrap();
    let join = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();

    // Degraded, not failed.
    let fact = types.dataflow().entry_fact(join).unwrap();
    assert_eq!(fact.local(0), Some(&TypeFact::Any));

    // The first missing class on the failing lookup is reported exactly once.
    let reported: Vec<String> = cache
        .collector()
        .iter()
        .map(|error| error.to_string())
        .collect();
    assert_eq!(
        reported
            .iter()
            .filter(|text| text.contains(ghost_a.name()))
            .count(),
        1
    );
}

#[test]
fn dead_store_is_detected_through_the_cache() {
    let m = method("wasteful", true);
    let mut asm = BodyAssembler::new(0, 1);
    asm.emit_push_int(1);
    asm.emit_store(0);
    asm.emit_push_int(2);
    asm.emit_store(0);
    asm.emit_load(0);
    asm.emit(Opcode::Pop);
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let stores = cache.get_method::<LiveStoreDataflow>(&m).unwrap();
    let entry = cfg.entry();
    assert!(stores
        .is_dead_store(&cfg, Location { node: entry, index: 1 })
        .unwrap());
    assert!(!stores
        .is_dead_store(&cfg, Location { node: entry, index: 3 })
        .unwrap());
}

#[test]
fn return_path_analysis_separates_throwing_branches() {
    let m = method("thrower", false);
    let mut asm = BodyAssembler::new(1, 1);
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfNull, "boom");
    asm.emit(Opcode::Return);
    asm.define_label("boom").unwrap();
    asm.emit_load(0);
    asm.emit(Opcode::Throw);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let paths = cache.get_method::<ReturnPathDataflow>(&m).unwrap();
    assert!(paths.can_return_from(cfg.entry()));
    let throwing = cfg
        .blocks()
        .find(|(_, b)| {
            b.last_instruction()
                .is_some_and(|i| i.opcode == Opcode::Throw)
        })
        .map(|(n, _)| n)
        .unwrap();
    assert!(!paths.can_return_from(throwing));
}

#[test]
fn orderings_expose_loop_back_edges() {
    let m = method("spinner", true);
    let mut asm = BodyAssembler::new(1, 1);
    asm.define_label("head").unwrap();
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "out");
    asm.emit_branch(Opcode::Goto, "head");
    asm.define_label("out").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cache = cache_with(&[(m.clone(), body)]);

    let cfg = cache.get_method::<ControlFlowGraph>(&m).unwrap();
    let dfs = cache.get_method::<DepthFirstSearch>(&m).unwrap();
    let rdfs = cache.get_method::<ReverseDepthFirstSearch>(&m).unwrap();

    let back_edges = cfg
        .node_ids()
        .flat_map(|node| cfg.outgoing(node).map(|(id, _, _)| id).collect::<Vec<_>>())
        .filter(|&edge| dfs.is_back_edge(edge))
        .count();
    assert_eq!(back_edges, 1);
    assert_eq!(rdfs.preorder().first(), Some(&cfg.exit()));

    let doms = cache.get_method::<Dominators>(&m).unwrap();
    let postdoms = cache.get_method::<Postdominators>(&m).unwrap();
    assert!(doms.dominates(cfg.entry(), cfg.exit()));
    assert!(postdoms.postdominates(cfg.exit(), cfg.entry()));
}
