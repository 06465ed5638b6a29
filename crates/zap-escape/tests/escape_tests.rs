use zap_escape::{
    Attr, Context, Delim, Element, ErrorCode, EscapeError, FUNCS, JsCtx, State, UrlPart, context_after_text,
    escape,
};
use zap_syntax::{Tree, compile, parse};

fn ctx(state: State) -> Context {
    Context::new(state)
}

fn after_text(input: &str) -> Result<Context, EscapeError> {
    let s = input.as_bytes();
    let mut c = Context::default();
    let mut i = 0;
    while i < s.len() {
        let (c1, n) = context_after_text(c, &s[i..])?;
        assert!(n > 0 || c1 != c, "no progress on {:?} at {}", input, i);
        c = c1;
        i += n;
    }
    Ok(c)
}

#[test]
fn test_escape_text_contexts() {
    let url = |delim, url_part| Context { state: State::Url, delim, url_part, ..Context::default() };
    let js = |delim, js_ctx| Context { state: State::Js, delim, js_ctx, ..Context::default() };
    let with_delim = |state, delim| Context { state, delim, ..Context::default() };
    let named = |state, attr| Context { state, attr, ..Context::default() };
    let element = |state, element| Context { state, element, ..Context::default() };
    let css_url = |state, url_part| Context { state, delim: Delim::DoubleQuote, url_part, ..Context::default() };

    let cases: Vec<(&str, Context)> = vec![
        ("", ctx(State::Text)),
        ("Hello, World!", ctx(State::Text)),
        ("I <3 Ponies!", ctx(State::Text)),
        ("<a", ctx(State::Tag)),
        ("<a ", ctx(State::Tag)),
        ("<a>", ctx(State::Text)),
        ("<a href", named(State::AttrName, Attr::Url)),
        ("<a on", named(State::AttrName, Attr::Script)),
        ("<a href ", named(State::AfterName, Attr::Url)),
        ("<a style  =  ", named(State::BeforeValue, Attr::Style)),
        ("<a href=", named(State::BeforeValue, Attr::Url)),
        ("<a href=x", url(Delim::SpaceOrTagEnd, UrlPart::PreQuery)),
        ("<a href=x ", ctx(State::Tag)),
        ("<a href=>", ctx(State::Text)),
        ("<a href=x>", ctx(State::Text)),
        ("<a href ='", url(Delim::SingleQuote, UrlPart::None)),
        ("<a href=''", ctx(State::Tag)),
        (r#"<a href= ""#, url(Delim::DoubleQuote, UrlPart::None)),
        (r#"<a href="""#, ctx(State::Tag)),
        (r#"<a title=""#, with_delim(State::Attr, Delim::DoubleQuote)),
        ("<a HREF='http:", url(Delim::SingleQuote, UrlPart::PreQuery)),
        ("<a Href='/", url(Delim::SingleQuote, UrlPart::PreQuery)),
        (r#"<a href='""#, url(Delim::SingleQuote, UrlPart::PreQuery)),
        (r#"<a href="'"#, url(Delim::DoubleQuote, UrlPart::PreQuery)),
        ("<a href='&apos;", url(Delim::SingleQuote, UrlPart::PreQuery)),
        (r#"<a href="&quot;"#, url(Delim::DoubleQuote, UrlPart::PreQuery)),
        (r#"<a href="&#34;"#, url(Delim::DoubleQuote, UrlPart::PreQuery)),
        ("<a href=&quot;", url(Delim::SpaceOrTagEnd, UrlPart::PreQuery)),
        (r#"<a href="/search?q="#, url(Delim::DoubleQuote, UrlPart::QueryOrFrag)),
        (r#"<img alt="1">"#, ctx(State::Text)),
        (r#"<img alt="1>"#, with_delim(State::Attr, Delim::DoubleQuote)),
        (r#"<img alt="1>">"#, ctx(State::Text)),
        (r#"<input checked type="checkbox""#, ctx(State::Tag)),
        (r#"<a onclick=""#, js(Delim::DoubleQuote, JsCtx::Regexp)),
        (r#"<a onclick="//foo"#, with_delim(State::JsLineCmt, Delim::DoubleQuote)),
        ("<a onclick='//\n", js(Delim::SingleQuote, JsCtx::Regexp)),
        ("<a onclick='//\r\n", js(Delim::SingleQuote, JsCtx::Regexp)),
        ("<a onclick='//\u{2028}", js(Delim::SingleQuote, JsCtx::Regexp)),
        (r#"<a onclick="/*"#, with_delim(State::JsBlockCmt, Delim::DoubleQuote)),
        (r#"<a onclick="/*/"#, with_delim(State::JsBlockCmt, Delim::DoubleQuote)),
        (r#"<a onclick="/**/"#, js(Delim::DoubleQuote, JsCtx::Regexp)),
        (r#"<a onkeypress="&quot;"#, with_delim(State::JsDqStr, Delim::DoubleQuote)),
        ("<a onclick='&quot;foo&quot;", js(Delim::SingleQuote, JsCtx::DivOp)),
        ("<a onclick=&#39;foo&#39;", js(Delim::SpaceOrTagEnd, JsCtx::DivOp)),
        ("<a onclick=&#39;foo", with_delim(State::JsSqStr, Delim::SpaceOrTagEnd)),
        (r#"<a onclick="&quot;foo'"#, with_delim(State::JsDqStr, Delim::DoubleQuote)),
        (r#"<a onclick="'foo&quot;"#, with_delim(State::JsSqStr, Delim::DoubleQuote)),
        (r#"<A ONCLICK="'"#, with_delim(State::JsSqStr, Delim::DoubleQuote)),
        (r#"<a onclick="/"#, with_delim(State::JsRegexp, Delim::DoubleQuote)),
        (r#"<a onclick="'foo'"#, js(Delim::DoubleQuote, JsCtx::DivOp)),
        (r#"<a onclick="'foo\'"#, with_delim(State::JsSqStr, Delim::DoubleQuote)),
        (r#"<a onclick="/foo/"#, js(Delim::DoubleQuote, JsCtx::DivOp)),
        ("<script>/foo/ /=", Context { state: State::Js, element: Element::Script, ..Context::default() }),
        (r#"<a onclick="1 /foo"#, js(Delim::DoubleQuote, JsCtx::DivOp)),
        (r#"<a onclick="1 /*c*/ /foo"#, js(Delim::DoubleQuote, JsCtx::DivOp)),
        (r#"<a onclick="/foo[/]"#, with_delim(State::JsRegexp, Delim::DoubleQuote)),
        (r#"<a onclick="/foo\/"#, with_delim(State::JsRegexp, Delim::DoubleQuote)),
        (r#"<input checked style=""#, with_delim(State::Css, Delim::DoubleQuote)),
        (r#"<a style="//"#, with_delim(State::CssLineCmt, Delim::DoubleQuote)),
        (r#"<a style="//</script>"#, with_delim(State::CssLineCmt, Delim::DoubleQuote)),
        ("<a style='//\n", with_delim(State::Css, Delim::SingleQuote)),
        ("<a style='//\r", with_delim(State::Css, Delim::SingleQuote)),
        (r#"<a style="/*"#, with_delim(State::CssBlockCmt, Delim::DoubleQuote)),
        (r#"<a style="/*/"#, with_delim(State::CssBlockCmt, Delim::DoubleQuote)),
        (r#"<a style="/**/"#, with_delim(State::Css, Delim::DoubleQuote)),
        (r#"<a style="background: '"#, with_delim(State::CssSqStr, Delim::DoubleQuote)),
        (r#"<a style="background: &quot;"#, with_delim(State::CssDqStr, Delim::DoubleQuote)),
        (r#"<a style="background: '/foo?img="#, css_url(State::CssSqStr, UrlPart::QueryOrFrag)),
        (r#"<a style="background: '/"#, css_url(State::CssSqStr, UrlPart::PreQuery)),
        (r#"<a style="background: url(&#x22;/"#, css_url(State::CssDqUrl, UrlPart::PreQuery)),
        (r#"<a style="background: url('/"#, css_url(State::CssSqUrl, UrlPart::PreQuery)),
        (r#"<a style="background: url('/)"#, css_url(State::CssSqUrl, UrlPart::PreQuery)),
        (r#"<a style="background: url('/ "#, css_url(State::CssSqUrl, UrlPart::PreQuery)),
        (r#"<a style="background: url(/"#, css_url(State::CssUrl, UrlPart::PreQuery)),
        (r#"<a style="background: url( "#, css_url(State::CssUrl, UrlPart::None)),
        (r#"<a style="background: url( /image?name="#, css_url(State::CssUrl, UrlPart::QueryOrFrag)),
        (r#"<a style="background: url(x)"#, with_delim(State::Css, Delim::DoubleQuote)),
        (r#"<a style="background: url('x'"#, with_delim(State::Css, Delim::DoubleQuote)),
        (r#"<a style="background: url( x "#, with_delim(State::Css, Delim::DoubleQuote)),
        ("<!-- foo", ctx(State::HtmlCmt)),
        ("<!-->", ctx(State::HtmlCmt)),
        ("<!--->", ctx(State::HtmlCmt)),
        ("<!-- foo -->", ctx(State::Text)),
        ("<script", element(State::Tag, Element::Script)),
        ("<script ", element(State::Tag, Element::Script)),
        (r#"<script src="foo.js" "#, element(State::Tag, Element::Script)),
        ("<script src='foo.js' ", element(State::Tag, Element::Script)),
        ("<script type=text/javascript ", element(State::Tag, Element::Script)),
        ("<script>", element(State::Js, Element::Script)),
        ("<script>foo", Context { state: State::Js, js_ctx: JsCtx::DivOp, element: Element::Script, ..Context::default() }),
        ("<script>foo</script>", ctx(State::Text)),
        ("<script>foo</script><!--", ctx(State::HtmlCmt)),
        (r#"<script>document.write("<p>foo</p>");"#, element(State::Js, Element::Script)),
        (r#"<script>document.write("<p>foo<\/script>");"#, element(State::Js, Element::Script)),
        (r#"<script>document.write("<script>alert(1)</script>");"#, ctx(State::Text)),
        ("<Script>", element(State::Js, Element::Script)),
        ("<SCRIPT>foo", Context { state: State::Js, js_ctx: JsCtx::DivOp, element: Element::Script, ..Context::default() }),
        ("<textarea>value", element(State::Rcdata, Element::Textarea)),
        ("<textarea>value</TEXTAREA>", ctx(State::Text)),
        ("<textarea name=html><b", element(State::Rcdata, Element::Textarea)),
        ("<title>value", element(State::Rcdata, Element::Title)),
        ("<style>value", element(State::Css, Element::Style)),
        ("<a xlink:href", named(State::AttrName, Attr::Url)),
        ("<a xmlns", named(State::AttrName, Attr::Url)),
        ("<a xmlns:foo", named(State::AttrName, Attr::Url)),
        ("<a xmlnsxyz", ctx(State::AttrName)),
        ("<a data-url", named(State::AttrName, Attr::Url)),
        ("<a data-iconUri", named(State::AttrName, Attr::Url)),
        ("<a data-urlItem", named(State::AttrName, Attr::Url)),
        ("<a g:", ctx(State::AttrName)),
        ("<a g:url", named(State::AttrName, Attr::Url)),
        ("<a g:iconUri", named(State::AttrName, Attr::Url)),
        ("<a g:urlItem", named(State::AttrName, Attr::Url)),
        ("<a g:value", ctx(State::AttrName)),
        ("<a svg:style='", with_delim(State::Css, Delim::SingleQuote)),
        ("<svg:font-face", ctx(State::Tag)),
        (r#"<svg:a svg:onclick=""#, js(Delim::DoubleQuote, JsCtx::Regexp)),
        (r#"<svg:a svg:onclick="x()">"#, ctx(State::Text)),
    ];

    for (input, want) in cases {
        match after_text(input) {
            Ok(got) => assert_eq!(got, want, "input: {:?}", input),
            Err(e) => panic!("input {:?}: unexpected error {}", input, e),
        }
    }
}

fn escaped(source: &str) -> Result<Tree, EscapeError> {
    let names: Vec<&str> = FUNCS.keys().copied().collect();
    let mut tree = parse(source, "test", "", "", &[&names]).unwrap();
    compile(&mut tree).unwrap();
    escape(tree)
}

fn body(tree: &Tree, name: &str) -> String {
    tree.get(name).unwrap().list.to_string()
}

#[test]
fn test_escape_actions_by_context() {
    let cases = [
        ("{{.T}}", "{{.T | zap_htmlescaper}}"),
        (r#"<a href="{{.U}}">x</a>"#, r#"<a href="{{.U | zap_urlfilter | zap_urlnormalizer | zap_attrescaper}}">x</a>"#),
        (r#"<a href="/search?q={{.Q}}">x</a>"#, r#"<a href="/search?q={{.Q | zap_urlescaper | zap_attrescaper}}">x</a>"#),
        (r#"<a href="/p/{{.P}}">x</a>"#, r#"<a href="/p/{{.P | zap_urlnormalizer | zap_attrescaper}}">x</a>"#),
        ("<a title={{.T}}>x</a>", "<a title={{.T | zap_nospaceescaper}}>x</a>"),
        ("<script>var x = {{.X}};</script>", "<script>var x = {{.X | zap_jsvalescaper}};</script>"),
        (r#"<script>var s = "{{.S}}";</script>"#, r#"<script>var s = "{{.S | zap_jsstrescaper}}";</script>"#),
        ("<script>var r = /{{.R}}/;</script>", "<script>var r = /{{.R | zap_jsregexpescaper}}/;</script>"),
        (r#"<a onclick="f({{.A}})">x</a>"#, r#"<a onclick="f({{.A | zap_jsvalescaper | zap_attrescaper}})">x</a>"#),
        ("<style>p { color: {{.C}} }</style>", "<style>p { color: {{.C | zap_cssvaluefilter}} }</style>"),
        (r#"<p style="background: url('{{.I}}')">x</p>"#, r#"<p style="background: url('{{.I | zap_urlfilter | zap_urlnormalizer | zap_attrescaper}}')">x</p>"#),
        (r#"<p style="font-family: '{{.F}}'">x</p>"#, r#"<p style="font-family: '{{.F | zap_urlfilter | zap_cssescaper}}'">x</p>"#),
        ("<textarea>{{.V}}</textarea>", "<textarea>{{.V | zap_rcdataescaper}}</textarea>"),
        ("<input {{.K}}={{.V}}>", "<input {{.K | zap_htmlnamefilter}}={{.V | zap_nospaceescaper}}>"),
        ("<p>{{$x := .X}}{{$x}}</p>", "<p>{{$x := .X}}{{$x | zap_htmlescaper}}</p>"),
        ("{{.T | html}}", "{{.T | html}}"),
    ];
    for (input, want) in cases {
        let source = format!(r#"{{{{define "a"}}}}{}{{{{end}}}}"#, input);
        let tree = escaped(&source).unwrap_or_else(|e| panic!("{}: {}", input, e));
        assert_eq!(body(&tree, "a"), want, "input: {}", input);
    }
}

#[test]
fn test_escape_text_rewrites() {
    let cases = [
        ("a < b", "a &lt; b"),
        ("<!DOCTYPE html><p>x</p>", "<!DOCTYPE html><p>x</p>"),
        ("<p>a<!-- hidden -->b</p>", "<p>ab</p>"),
        ("{{raw}}<script>a/* c */b</script>{{end}}", "<script>a b</script>"),
        ("{{raw}}<script>a/* c\n */b</script>{{end}}", "<script>a\nb</script>"),
        ("{{raw}}<style>p /* c */ {}</style>{{end}}", "<style>p   {}</style>"),
    ];
    for (input, want) in cases {
        let source = format!(r#"{{{{define "a"}}}}{}{{{{end}}}}"#, input);
        let tree = escaped(&source).unwrap_or_else(|e| panic!("{}: {}", input, e));
        assert_eq!(body(&tree, "a"), want, "input: {}", input);
    }
}

#[test]
fn test_template_call_is_escaped_in_callee_context() {
    let tree = escaped(
        r#"{{define "main"}}<a href="{{template "u" .}}">x</a>{{end}}{{define "u"}}{{.}}{{end}}"#,
    )
    .unwrap();
    assert_eq!(body(&tree, "main"), r#"<a href="{{template "u" .}}">x</a>"#);
    assert_eq!(body(&tree, "u"), "{{. | zap_urlfilter | zap_urlnormalizer | zap_attrescaper}}");
}

#[test]
fn test_recursive_template() {
    let tree = escaped(
        r#"{{define "list"}}<ul>{{range .}}<li>{{.Name}}{{template "list" .Kids}}</li>{{end}}</ul>{{end}}"#,
    )
    .unwrap();
    assert_eq!(
        body(&tree, "list"),
        r#"<ul>{{range .}}<li>{{.Name | zap_htmlescaper}}{{template "list" .Kids}}</li>{{end}}</ul>"#
    );
}

#[test]
fn test_branch_contexts_must_join() {
    let err = escaped(r#"{{define "a"}}{{if .C}}<a href="{{end}}">{{end}}"#).unwrap_err();
    assert_eq!(err.code, ErrorCode::BranchEnd);
    assert!(err.to_string().starts_with("escape: a:1: {{if}} branches end in different contexts"));
}

#[test]
fn test_entry_must_end_in_text() {
    let err = escaped(r#"{{define "a"}}<a href="{{end}}"#).unwrap_err();
    assert_eq!(err.code, ErrorCode::EndContext);
    assert_eq!(err.template.as_deref(), Some("a"));
}

#[test]
fn test_template_invoked_in_different_contexts() {
    let err = escaped(
        r#"{{define "main"}}{{template "u"}}<a href="{{template "u"}}">{{end}}{{define "u"}}{{.}}{{end}}"#,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvokedContexts);
    assert_eq!(err.template.as_deref(), Some("main"));
}

#[test]
fn test_no_such_template() {
    let err = escaped(r#"{{define "a"}}{{template "missing"}}{{end}}"#).unwrap_err();
    assert_eq!(err.code, ErrorCode::NoSuchTemplate);
    assert!(err.description.contains("\"missing\""));
}

#[test]
fn test_ambiguous_url() {
    let err = escaped(
        r#"{{define "a"}}<a href="{{if .C}}/path/{{else}}/search?q={{end}}{{.X}}">x</a>{{end}}"#,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::AmbigContext);
}

#[test]
fn test_bad_html_in_attribute() {
    let err = escaped(r#"{{define "a"}}<a b"c>x</a>{{end}}"#).unwrap_err();
    assert_eq!(err.code, ErrorCode::BadHtml);
}

#[test]
fn test_fill_must_be_compiled() {
    let mut tree = parse(
        r#"{{define "base"}}{{block "b"}}x{{end}}{{end}}{{define "a"}}{{fill "base"}}{{end}}{{end}}"#,
        "test",
        "",
        "",
        &[],
    )
    .unwrap();
    let err = escape(tree.clone()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotCompiled);

    compile(&mut tree).unwrap();
    assert!(escape(tree).is_ok());
}

#[test]
fn test_escaped_tree_reparses() {
    let tree = escaped(
        r#"{{define "a"}}<a href="{{.U}}" onclick="f({{.A}})">{{if .B}}{{.B}}{{else}}none{{end}}</a>{{end}}"#,
    )
    .unwrap();
    let printed = tree.to_string();
    let names: Vec<&str> = FUNCS.keys().copied().collect();
    let reparsed = parse(&printed, "again", "", "", &[&names]).unwrap();
    assert_eq!(reparsed.to_string(), printed);
}
