#![allow(clippy::unwrap_used)]
//! End-to-end tests of the scan lifecycle: planning through the provider, then opening,
//! fetching, rescanning and ending custom scans over the in-memory engine.

mod common;

mod scan {
	use std::sync::Arc;

	use ixscan_core::catalog::{Attribute, Oid, RelKind, TypeId};
	use ixscan_core::err::Error;
	use ixscan_core::exec::{ExecFlags, end_node, exec_proc_node, init_node, rescan_node};
	use ixscan_core::expr::{CmpOp, Expr};
	use ixscan_core::mem::memory_reporters_allocated_by_name;
	use ixscan_core::planner::path::BitmapQual;
	use ixscan_core::planner::plan::{Plan, PlanCost, Scan};
	use ixscan_core::scan::compiler::PlanKind;
	use ixscan_core::scan::executor::{self, ScanStatus, create_custom_scan_state};
	use ixscan_core::scan::methods::{is_ix_custom_scan, is_ix_custom_scan_state};
	use ixscan_core::storage::mem::{IndexDef, MemEngine, TableDef};
	use serial_test::serial;
	use test_log::test;

	use super::common::{
		Fixture, ORDERS_CUSTOMER, ORDERS_STATUS, amount_above, customer_is, drain, ids, index,
		open_or_customer_one, status_is, take,
	};

	const OPEN: [i64; 6] = [3, 6, 9, 12, 15, 18];

	fn open_orders(fixture: &Fixture) -> Plan {
		fixture.plan(index(ORDERS_STATUS, status_is("open")), vec![status_is("open")]).unwrap()
	}

	#[test]
	fn bitmap_path_compiles_to_a_custom_scan() {
		let fixture = Fixture::orders();
		let Plan::CustomScan(cscan) = open_orders(&fixture) else {
			panic!("expected a custom scan");
		};
		assert!(is_ix_custom_scan(&cscan));
		assert_eq!(cscan.custom_private.kind, PlanKind::BitmapHeap);
		assert_eq!(cscan.custom_private.key_type, TypeId::INT4);
		assert_eq!(cscan.scan.scanrelid, 1);
		assert_eq!(cscan.custom_plans.len(), 1);
		assert!(matches!(cscan.custom_plans[0], Plan::BitmapHeapScan(_)));
		// The index condition is rechecked rather than filtered
		assert!(cscan.scan.qual.is_empty());
	}

	#[test]
	fn compilation_is_deterministic() {
		let fixture = Fixture::orders();
		let (Plan::CustomScan(first), Plan::CustomScan(second)) =
			(open_or_customer_one(&fixture), open_or_customer_one(&fixture))
		else {
			panic!("expected custom scans");
		};
		assert_eq!(first.custom_private.kind, PlanKind::BitmapHeap);
		assert_eq!(first.custom_plans.len(), 1);
		assert!(matches!(
			&first.custom_plans[0],
			Plan::BitmapHeapScan(heap) if matches!(*heap.bitmapqualplan, Plan::BitmapOr(_))
		));
		assert_eq!(first.custom_private, second.custom_private);
		assert_eq!(first.scan, second.scan);
		assert!(std::ptr::eq(first.methods, second.methods));
		let (Plan::BitmapHeapScan(a), Plan::BitmapHeapScan(b)) =
			(&first.custom_plans[0], &second.custom_plans[0])
		else {
			panic!("expected nested bitmap heap scans");
		};
		assert_eq!(a.scan, b.scan);
		assert_eq!(a.bitmapqualorig, b.bitmapqualorig);
	}

	#[test]
	fn multi_field_primary_keys_are_rejected() {
		let engine = MemEngine::new();
		let relation = engine
			.create_table(TableDef {
				oid: Oid(200),
				name: "order_lines".to_owned(),
				relkind: RelKind::Table,
				columns: vec![
					Attribute::new("order_id", TypeId::INT4),
					Attribute::new("line", TypeId::INT4),
					Attribute::new("sku", TypeId::TEXT),
				],
				primary_key: Some(IndexDef::new(201, "order_lines_pkey", &[0, 1])),
				indexes: vec![IndexDef::new(202, "order_lines_sku", &[2])],
			})
			.unwrap();
		let fixture = Fixture::with_relation(engine, relation);
		let sku = Expr::op(
			CmpOp::Eq,
			Expr::var(1, 3, TypeId::TEXT),
			Expr::constant("widget", TypeId::TEXT),
		);
		let err = fixture.plan(index(Oid(202), sku.clone()), vec![sku]).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unreachable(_))), "{err:?}");
	}

	#[test]
	fn returns_matching_rows_in_key_order() {
		let fixture = Fixture::orders();
		let rows = fixture.run(&open_orders(&fixture), false).unwrap();
		assert_eq!(ids(&rows), OPEN);
		assert_eq!(rows[0].len(), 4);
		assert!(rows.iter().all(|row| row[1] == "open".into()));
	}

	#[test]
	fn or_combines_two_indexes() {
		let fixture = Fixture::orders();
		let rows = fixture.run(&open_or_customer_one(&fixture), false).unwrap();
		assert_eq!(ids(&rows), [1, 3, 6, 9, 11, 12, 15, 16, 18]);
	}

	#[test]
	fn and_intersects_two_indexes() {
		let fixture = Fixture::orders();
		let plan = fixture
			.plan(
				BitmapQual::And(vec![
					index(ORDERS_STATUS, status_is("open")),
					index(ORDERS_CUSTOMER, customer_is(1)),
				]),
				vec![status_is("open"), customer_is(1)],
			)
			.unwrap();
		assert_eq!(ids(&fixture.run(&plan, false).unwrap()), [6]);
	}

	#[test]
	fn filter_counts_removed_rows() {
		let fixture = Fixture::orders();
		let plan = fixture
			.plan(index(ORDERS_STATUS, status_is("open")), vec![status_is("open"), amount_above(1000)])
			.unwrap();
		let ctx = fixture.context(true);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert_eq!(ids(&drain(&mut state, &ctx).unwrap()), [12, 15, 18]);
		let instr = state.instrument().unwrap();
		assert_eq!(instr.nfiltered1, 3);
		assert_eq!(instr.nfiltered2, 0);
		assert_eq!(instr.tuples, 3);
		end_node(&mut state, &ctx).unwrap();
	}

	#[test]
	fn lifecycle_moves_through_its_states() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(false);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		let custom = state.custom.as_deref().unwrap();
		assert!(is_ix_custom_scan_state(custom));
		assert_eq!(custom.status(), ScanStatus::Opened);
		assert!(custom.snapshot().is_some());
		take(&mut state, &ctx, 1).unwrap();
		assert_eq!(state.custom.as_deref().unwrap().status(), ScanStatus::Fetching);
		rescan_node(&mut state, &ctx).unwrap();
		assert_eq!(state.custom.as_deref().unwrap().status(), ScanStatus::Opened);
		end_node(&mut state, &ctx).unwrap();
		let custom = state.custom.as_deref().unwrap();
		assert_eq!(custom.status(), ScanStatus::Ended);
		assert_eq!(custom.rows_returned(), 1);
		// Ending twice is harmless
		end_node(&mut state, &ctx).unwrap();
		let err = exec_proc_node(&mut state, &ctx).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ScanNotOpen)));
	}

	#[test]
	fn exhausted_scans_keep_returning_the_end_marker() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(false);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert_eq!(drain(&mut state, &ctx).unwrap().len(), OPEN.len());
		assert!(exec_proc_node(&mut state, &ctx).unwrap().is_none());
		assert!(exec_proc_node(&mut state, &ctx).unwrap().is_none());
		end_node(&mut state, &ctx).unwrap();
	}

	#[test]
	fn rescan_replays_the_same_snapshot() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(false);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert_eq!(ids(&take(&mut state, &ctx, 2).unwrap()), [3, 6]);
		// Neither change is visible to the snapshot captured when the scan opened
		fixture.insert(21);
		fixture.delete(9);
		rescan_node(&mut state, &ctx).unwrap();
		assert_eq!(ids(&drain(&mut state, &ctx).unwrap()), OPEN);
		rescan_node(&mut state, &ctx).unwrap();
		assert_eq!(ids(&drain(&mut state, &ctx).unwrap()), OPEN);
		end_node(&mut state, &ctx).unwrap();
		// A scan opened afterwards sees both
		assert_eq!(ids(&fixture.run(&plan, false).unwrap()), [3, 6, 12, 15, 18, 21]);
	}

	#[test]
	fn rows_deleted_before_open_never_appear() {
		let fixture = Fixture::orders();
		fixture.delete(3);
		fixture.delete(18);
		let plan = open_orders(&fixture);
		assert_eq!(ids(&fixture.run(&plan, false).unwrap()), [6, 9, 12, 15]);
	}

	#[test]
	fn counters_cover_every_index_and_reset_on_rescan() {
		let fixture = Fixture::orders();
		let plan = open_or_customer_one(&fixture);
		let ctx = fixture.context(true);
		assert!(ctx.counters().is_empty());
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		{
			let counters = state.custom.as_deref().unwrap().counters().unwrap();
			assert_eq!(counters.len(), 3);
			assert!(counters.all_zero());
		}
		assert_eq!(drain(&mut state, &ctx).unwrap().len(), 9);
		{
			let counters = state.custom.as_deref().unwrap().counters().unwrap();
			let (pkey, status, customer) =
				(counters.index(0).unwrap(), counters.index(1).unwrap(), counters.index(2).unwrap());
			assert_eq!((pkey.calls(), pkey.rows()), (0, 0));
			assert_eq!((status.calls(), status.rows()), (1, 6));
			assert_eq!((customer.calls(), customer.rows()), (1, 4));
			assert_eq!((counters.scan().calls(), counters.scan().rows()), (9, 9));
		}
		rescan_node(&mut state, &ctx).unwrap();
		assert!(state.custom.as_deref().unwrap().counters().unwrap().all_zero());
		end_node(&mut state, &ctx).unwrap();
		assert!(state.custom.as_deref().unwrap().counters().is_none());
		assert!(ctx.counters().is_empty());
	}

	#[test]
	fn uninstrumented_scans_have_no_counters() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(false);
		assert!(ctx.counters().is_empty());
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert!(state.custom.as_deref().unwrap().counters().is_none());
		assert!(state.instrument().is_none());
		drain(&mut state, &ctx).unwrap();
		end_node(&mut state, &ctx).unwrap();
		assert!(ctx.counters().is_empty());
	}

	#[test]
	fn end_releases_every_arena() {
		let fixture = Fixture::orders();
		let plan = open_or_customer_one(&fixture);
		let ctx = fixture.context(true);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert_eq!(ctx.query_arena().live_children(), 1);
		let opened = ctx.query_arena().allocated();
		assert!(opened > 0);
		take(&mut state, &ctx, 3).unwrap();
		assert!(ctx.query_arena().allocated() > opened);
		rescan_node(&mut state, &ctx).unwrap();
		// The cursor is gone, the counters are not
		assert_eq!(ctx.query_arena().allocated(), opened);
		drain(&mut state, &ctx).unwrap();
		end_node(&mut state, &ctx).unwrap();
		assert_eq!(ctx.query_arena().allocated(), 0);
		assert_eq!(ctx.query_arena().live_children(), 0);
	}

	#[test]
	fn dropping_an_open_scan_releases_its_arena() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(true);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		take(&mut state, &ctx, 1).unwrap();
		assert_eq!(ctx.query_arena().live_children(), 1);
		drop(state);
		assert_eq!(ctx.query_arena().allocated(), 0);
		assert_eq!(ctx.query_arena().live_children(), 0);
	}

	#[test]
	fn counters_slot_is_empty_between_fetches_and_after_drop() {
		let fixture = Fixture::orders();
		let plan = open_orders(&fixture);
		let ctx = fixture.context(true);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		take(&mut state, &ctx, 1).unwrap();
		assert!(ctx.counters().is_empty());
		let scan = state.custom.as_deref().unwrap().counters().unwrap().scan().clone();
		assert_eq!(scan.calls(), 1);
		drop(state);
		assert!(ctx.counters().is_empty());
		// Only the handle taken above keeps the dropped scan's counters alive
		assert_eq!(Arc::strong_count(&scan), 1);
	}

	#[test]
	#[serial]
	fn scan_arenas_report_while_open() {
		let engine = MemEngine::new();
		let relation = engine
			.create_table(TableDef {
				oid: Oid(300),
				name: "archived_orders".to_owned(),
				relkind: RelKind::Table,
				columns: vec![Attribute::new("id", TypeId::INT8), Attribute::new("status", TypeId::TEXT)],
				primary_key: Some(IndexDef::new(301, "archived_orders_pkey", &[0])),
				indexes: vec![IndexDef::new(302, "archived_orders_status", &[1])],
			})
			.unwrap();
		for id in 1..=5_i64 {
			engine.insert(Oid(300), vec![id.into(), "open".into()]).unwrap();
		}
		let fixture = Fixture::with_relation(engine, relation);
		let plan = fixture.plan(index(Oid(302), status_is("open")), vec![status_is("open")]).unwrap();
		let ctx = fixture.context(true);
		let mut state = init_node(&plan, &ctx, ExecFlags::default()).unwrap();
		assert_eq!(ids(&drain(&mut state, &ctx).unwrap()), [1, 2, 3, 4, 5]);
		let reported = memory_reporters_allocated_by_name();
		assert!(reported.get("scan archived_orders").is_some_and(|bytes| *bytes > 0));
		end_node(&mut state, &ctx).unwrap();
		assert!(!memory_reporters_allocated_by_name().contains_key("scan archived_orders"));
	}

	#[test]
	fn ending_a_scan_that_never_opened_is_harmless() {
		let fixture = Fixture::orders();
		let Plan::CustomScan(cscan) = open_orders(&fixture) else {
			panic!("expected a custom scan");
		};
		let ctx = fixture.context(false);
		let mut node = create_custom_scan_state(&cscan).unwrap();
		assert_eq!(node.status(), ScanStatus::Created);
		let err = executor::exec(&mut node, &ctx).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ScanNotOpen)));
		let err = executor::rescan(&mut node, &ctx).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ScanNotOpen)));
		executor::end(&mut node, &ctx).unwrap();
		assert_eq!(node.status(), ScanStatus::Ended);
		assert_eq!(ctx.query_arena().live_children(), 0);
	}

	#[test]
	fn opening_twice_fails() {
		let fixture = Fixture::orders();
		let Plan::CustomScan(cscan) = open_orders(&fixture) else {
			panic!("expected a custom scan");
		};
		let ctx = fixture.context(false);
		let mut node = create_custom_scan_state(&cscan).unwrap();
		node.attach_relation(fixture.relation.clone(), None);
		executor::begin(&mut node, &ctx, ExecFlags::default()).unwrap();
		let err = executor::begin(&mut node, &ctx, ExecFlags::default()).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unreachable(_))));
		executor::end(&mut node, &ctx).unwrap();
	}

	#[test]
	fn nested_plans_other_than_bitmap_heap_scans_are_rejected() {
		let fixture = Fixture::orders();
		let Plan::CustomScan(mut cscan) = open_orders(&fixture) else {
			panic!("expected a custom scan");
		};
		cscan.custom_plans = vec![Plan::SeqScan(Scan {
			cost: PlanCost::default(),
			targetlist: fixture.tlist(),
			qual: Vec::new(),
			scanrelid: 1,
		})];
		let err = create_custom_scan_state(&cscan).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unreachable(_))));
	}
}
