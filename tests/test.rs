use dbcc::{
    context::{CompilationContext, PtrSize},
    ir::{InstrKind, Module, Terminator, VReg},
    Compiler,
};

use std::sync::Once;

/// Setup function that is only run once, even if called multiple times.
fn setup() {
    static INIT: Once = Once::new();
    INIT.call_once(|| env_logger::init());
}

fn run_ok(src: &str) -> Module {
    setup();
    let mut c = Compiler::new().quiet();
    c.run(src).unwrap()
}

fn run_err(src: &str) {
    setup();
    let mut c = Compiler::new().quiet();
    c.run(src).unwrap_err();
}

/// First error message reported for `src`.
fn error_of(src: &str) -> String {
    setup();
    let unit = Compiler::new().quiet().compile_unit("test.dba", src);
    assert!(unit.module.is_err());
    unit.diagnostics
        .into_iter()
        .next()
        .map(|d| d.message)
        .unwrap_or_default()
}

fn ir_of(src: &str) -> String {
    run_ok(src).to_string()
}

/// Every call in `func` as (callee, args), in emission order.
fn calls(module: &Module, func: &str) -> Vec<(String, Vec<VReg>, Option<VReg>)> {
    let f = module.function(func).unwrap();
    f.blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter_map(|i| match &i.kind {
            InstrKind::Call { func, args } => Some((func.clone(), args.clone(), i.result)),
            _ => None,
        })
        .collect()
}

#[test]
fn empty_program() {
    let m = run_ok("");
    assert!(m.function("main").is_some());
}

#[test]
fn arithmetic() {
    run_ok(
        r#"
        a = 10
        b = 20
        c = a + b * 2 - (a / 3) % 4
        d# = c ^ 2
        e = 2 ^ 10
        a += b
        "#,
    );
}

#[test]
fn string_concat_and_compare() {
    let ir = ir_of(
        r#"
        a$ = "hello"
        b$ = a$ + " world"
        if a$ = b$ then print "same"
        "#,
    );
    assert!(ir.contains("@__rt_string_concat"));
    assert!(ir.contains("@__rt_string_cmp"));
}

#[test]
fn two_string_temporaries_are_freed_in_reverse() {
    let m = run_ok(
        r#"
        function f()
            local a as string = "one"
            local b as string = "two"
        endfunction
        "#,
    );
    let calls = calls(&m, "f");
    let made: Vec<_> = calls
        .iter()
        .filter(|(name, _, _)| name == "__rt_string_from_lit")
        .filter_map(|(_, _, r)| *r)
        .collect();
    assert_eq!(made.len(), 2);
    let freed: Vec<_> = calls
        .iter()
        .filter(|(name, _, _)| name == "__rt_string_free")
        .map(|(_, args, _)| args[0])
        .filter(|v| made.contains(v))
        .collect();
    assert_eq!(freed, vec![made[1], made[0]]);
}

#[test]
fn returned_string_is_not_freed() {
    let m = run_ok(
        r#"
        function greet() as string
            return "hi"
        endfunction
        print greet()
        "#,
    );
    let calls = calls(&m, "greet");
    let made = calls
        .iter()
        .find(|(name, _, _)| name == "__rt_string_from_lit")
        .and_then(|(_, _, r)| *r)
        .unwrap();
    assert!(!calls
        .iter()
        .any(|(name, args, _)| name == "__rt_string_free" && args[0] == made));
}

#[test]
fn for_to_tests_after_body() {
    let ir = ir_of(
        r#"
        for i = 1 to 3
            print i
        next i
        "#,
    );
    assert!(ir.contains("for.next"));
    assert!(!ir.contains("for.head"));
}

#[test]
fn for_until_tests_before_body() {
    let ir = ir_of(
        r#"
        for i = 1 until 3
            print i
        next
        "#,
    );
    assert!(ir.contains("for.head"));
    assert!(!ir.contains("for.next"));
}

#[test]
fn for_with_step() {
    run_ok(
        r#"
        for f# = 0.0 to 1.0 step 0.25
            print f#
        next f#
        "#,
    );
}

#[test]
fn loops_and_jumps() {
    run_ok(
        r#"
        i = 0
        do
            i += 1
            if i > 10 then exit
            if i % 2 = 0 then continue
        loop
        while i > 0
            i -= 1
        endwhile
        repeat
            i += 1
        until i = 5
        "#,
    );
}

#[test]
fn exit_releases_loop_temporaries() {
    let m = run_ok(
        r#"
        do
            s$ = "x" + "y"
            exit
        loop
        "#,
    );
    let frees = calls(&m, "main")
        .iter()
        .filter(|(name, _, _)| name == "__rt_string_free")
        .count();
    assert!(frees >= 3);
}

#[test]
fn string_loop_variable() {
    let m = run_ok(
        r#"
        for s$ = "" to "aaa" step "a"
            print s$
        next s$
        "#,
    );
    let names: Vec<_> = calls(&m, "main").into_iter().map(|(n, _, _)| n).collect();
    assert!(names.contains(&"__rt_string_concat".to_string()));
    assert!(names.contains(&"__rt_string_cmp".to_string()));
    assert!(names.contains(&"__rt_string_assign".to_string()));
}

#[test]
fn string_loop_variable_needs_step() {
    let msg = error_of(
        r#"
        for s$ = "" to "aaa"
        next
        "#,
    );
    assert!(msg.contains("needs a step"), "{}", msg);
}

#[test]
fn declared_loop_variable_must_be_numeric() {
    let msg = error_of(
        r#"
        s$ = "x"
        for s$ = "" to "aa" step "a"
        next
        "#,
    );
    assert!(msg.contains("must be numeric"), "{}", msg);
}

#[test]
fn compound_assignment_evaluates_target_once() {
    let m = run_ok(
        r#"
        function idx()
            return 1
        endfunction
        dim a[4] as integer
        a[idx()] += 5
        "#,
    );
    let idx_calls = calls(&m, "main")
        .iter()
        .filter(|(name, _, _)| name == "idx")
        .count();
    assert_eq!(idx_calls, 1);
}

#[test]
fn compound_assignment_to_swizzle() {
    let ir = ir_of(
        r#"
        v as vec3f = vec3f(1.0, 2.0, 3.0)
        v.xy += v.zz
        "#,
    );
    assert!(ir.contains("insertelement"));
}

#[test]
fn no_cleanup_after_return() {
    let m = run_ok(
        r#"
        function f()
            s$ = "a" + "b"
            return
        endfunction
        "#,
    );
    let f = m.function("f").unwrap();
    let dead: Vec<_> = f
        .blocks
        .iter()
        .filter(|b| b.label.as_deref() == Some("after.return"))
        .collect();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].instructions.is_empty());
    assert_eq!(dead[0].terminator, Some(Terminator::Unreachable));
}

#[test]
fn string_parameter_takes_no_conversion() {
    run_err(
        r#"
        function f(s as string)
        endfunction
        f(5)
        "#,
    );
}

#[test]
fn goto_label() {
    let ir = ir_of(
        r#"
        i = 0
        top:
        i += 1
        if i < 3 then goto top
        "#,
    );
    assert!(ir.contains("; top"));
}

#[test]
fn select_with_fallthrough() {
    let ir = ir_of(
        r#"
        x = 2
        select x
            case 1, 2
                print "small"
                fallthrough
            case 3
                print "three"
            case default
                print "other"
        endselect
        "#,
    );
    assert!(ir.contains("case.default"));
    assert!(ir.contains("select.end"));
}

#[test]
fn select_on_strings() {
    let ir = ir_of(
        r#"
        name$ = "b"
        select name$
            case "a"
                print 1
            case "b"
                print 2
        endselect
        "#,
    );
    assert!(ir.contains("@__rt_string_cmp"));
}

#[test]
fn overload_picks_exact_match() {
    let m = run_ok(
        r#"
        function f(a as integer) as integer
            return 1
        endfunction
        function f(a as float) as integer
            return 2
        endfunction
        x = f(1)
        y = f(1.5)
        "#,
    );
    let names: Vec<_> = calls(&m, "main").into_iter().map(|(n, _, _)| n).collect();
    assert!(names.contains(&"f".to_string()));
    assert!(names.contains(&"f.1".to_string()));
}

#[test]
fn overload_tie_prefers_first_declared() {
    let m = run_ok(
        r#"
        function f(a as integer) as integer
            return 1
        endfunction
        function f(a as float) as integer
            return 2
        endfunction
        b as byte = 3
        x = f(b)
        "#,
    );
    let names: Vec<_> = calls(&m, "main").into_iter().map(|(n, _, _)| n).collect();
    assert!(names.contains(&"f".to_string()));
    assert!(!names.contains(&"f.1".to_string()));
}

#[test]
fn duplicate_overload() {
    run_err(
        r#"
        function f(a as integer)
        endfunction
        function f(b as integer)
        endfunction
        "#,
    );
}

#[test]
fn missing_overload() {
    let msg = error_of(
        r#"
        function f(a as integer)
        endfunction
        f("text")
        "#,
    );
    assert!(msg.contains("No overload"), "{}", msg);
}

#[test]
fn byref_parameter() {
    let ir = ir_of(
        r#"
        function inc(byref a as integer)
            a += 1
        endfunction
        x = 1
        inc(x)
        "#,
    );
    assert!(ir.contains("define void @inc(*i32"));
}

#[test]
fn byref_needs_lvalue() {
    run_err(
        r#"
        function inc(byref a as integer)
            a += 1
        endfunction
        inc(1 + 2)
        "#,
    );
}

#[test]
fn builtins() {
    let ir = ir_of(
        r#"
        print "a"
        print 1
        print 2.0
        print
        x = max(1, 2, 3)
        s$ = mid$("hello", 2)
        "#,
    );
    assert!(ir.contains("@dbrt_print_str"));
    assert!(ir.contains("@dbrt_max_int"));
    assert!(ir.contains("declare i32 @dbrt_max_int(i32, i32, ...)"));
}

#[test]
fn same_scope_redeclaration() {
    run_err(
        r#"
        x as integer
        x as float
        "#,
    );
}

#[test]
fn local_shadows_global() {
    run_ok(
        r#"
        x as integer = 1
        function f() as float
            local x as float = 2.5
            return x
        endfunction
        y# = f()
        "#,
    );
}

#[test]
fn single_line_if_matches_block_if() {
    setup();
    let c = Compiler::new().quiet();
    let a = c.parse("a.dba", "if x then print y").unwrap();
    let b = c.parse("b.dba", "if x : print y : endif").unwrap();
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn user_types() {
    let ir = ir_of(
        r#"
        type Point
            x as float
            y as float
            name as string
        endtype
        p as Point
        p.x = 1.0
        p.name = "origin"
        d# = p.x + p.y
        "#,
    );
    assert!(ir.contains("type %point = "));
}

#[test]
fn unknown_member() {
    let msg = error_of(
        r#"
        type Point
            x as float
        endtype
        p as Point
        p.z = 1.0
        "#,
    );
    assert!(msg.contains('z'), "{}", msg);
}

#[test]
fn vectors_and_swizzles() {
    let ir = ir_of(
        r#"
        v as vec3f = vec3f(1.0, 2.0, 3.0)
        w as vec3f = v + v
        v.xy = w.zx
        f# = v.x
        "#,
    );
    assert!(ir.contains("shuffle"));
    assert!(ir.contains("insertelement"));
}

#[test]
fn bad_swizzle() {
    run_err(
        r#"
        v as vec2f
        f# = v.z
        "#,
    );
}

#[test]
fn arrays() {
    let ir = ir_of(
        r#"
        dim a[10] as integer
        a[1] = 5
        a[2] = a[1] + 1
        "#,
    );
    assert!(ir.contains("@__rt_array_new"));
    assert!(ir.contains("@__rt_array_elem"));
}

#[test]
fn explicit_casts() {
    run_ok(
        r#"
        f# = 2.75
        i = integer(f#)
        s$ = string(i)
        b as byte = byte(i)
        "#,
    );
}

#[test]
fn implicit_string_conversion_in_assignment() {
    let ir = ir_of(
        r#"
        s$ = 10
        "#,
    );
    assert!(ir.contains("@__rt_to_string_int"));
}

#[test]
fn string_arithmetic_is_rejected() {
    run_err(
        r#"
        a$ = "x" - "y"
        "#,
    );
}

#[test]
fn string_to_integer_is_rejected() {
    let msg = error_of(
        r#"
        x as integer = "text"
        "#,
    );
    assert!(msg.contains("Cannot convert"), "{}", msg);
}

#[test]
fn exit_outside_loop() {
    run_err("exit");
}

#[test]
fn continue_outside_loop() {
    run_err("continue");
}

#[test]
fn fallthrough_in_last_case() {
    run_err(
        r#"
        select 1
            case 1
                fallthrough
        endselect
        "#,
    );
}

#[test]
fn return_value_outside_function() {
    run_err("return 1");
}

#[test]
fn nested_function() {
    run_err(
        r#"
        function outer()
            function inner()
            endfunction
        endfunction
        "#,
    );
}

#[test]
fn goto_unknown_label() {
    run_err("goto nowhere");
}

#[test]
fn duplicate_label() {
    run_err(
        r#"
        here:
        here:
        "#,
    );
}

#[test]
fn next_names_other_variable() {
    run_err(
        r#"
        for i = 1 to 3
        next j
        "#,
    );
}

#[test]
fn undefined_function() {
    run_err("x = nothing(1)");
}

#[test]
fn unterminated_string() {
    run_err("a$ = \"abc\nprint a$");
}

#[test]
fn unterminated_block() {
    run_err(
        r#"
        while 1
            print 1
        "#,
    );
}

#[test]
fn recursive_function_needs_return_type() {
    run_ok(
        r#"
        function fact(n as integer) as integer
            if n <= 1 then return 1
            return n * fact(n - 1)
        endfunction
        print fact(5)
        "#,
    );
}

#[test]
fn end_value_of_function() {
    let ir = ir_of(
        r#"
        function seven() as integer
        endfunction 7
        x = seven()
        "#,
    );
    assert!(ir.contains("define i32 @seven()"));
}

#[test]
fn pointer_width_follows_context() {
    setup();
    let mut c = Compiler::with_context(CompilationContext::new(PtrSize::Bits32)).quiet();
    let ir = c.run("p as intptr").unwrap().to_string();
    assert!(ir.contains("@g.p = global i32"), "{}", ir);

    let ir = run_ok("p as intptr").to_string();
    assert!(ir.contains("@g.p = global i64"), "{}", ir);
}

#[test]
fn end_terminates() {
    let ir = ir_of(
        r#"
        print 1
        end
        print 2
        "#,
    );
    assert!(ir.contains("@__rt_end"));
    assert!(ir.contains("unreachable"));
}

#[test]
fn diagnostics_carry_position() {
    setup();
    let unit = Compiler::new()
        .quiet()
        .compile_unit("pos.dba", "x = 1\ny = undefined_fn(2)\n");
    assert!(unit.module.is_err());
    let d = &unit.diagnostics[0];
    assert_eq!(d.filename.as_ref(), "pos.dba");
    assert_eq!(d.line, 2);
}
