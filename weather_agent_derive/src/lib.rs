use proc_macro::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{
    parse_macro_input, token, Attribute, Data, DeriveInput, Fields, GenericArgument, Lit, LitStr,
    Meta, PathArguments, Token, Type,
};

/// Derive macro for the `StructuredProvider` trait
///
/// Generates a JSON schema for a struct so it can be used as a structured
/// response format or as the typed arguments of a tool.
///
/// Doc comments (or `#[schema(description = "...")]`) become descriptions.
/// `Option<T>` fields are left out of `required`, `Vec<T>` fields become arrays.
/// Serde's `rename`, `rename_all` and `skip` are honoured so the schema matches
/// what deserialization expects. Any other field type is embedded through its
/// own `StructuredProvider` implementation.
///
/// # Example
/// ```ignore
/// use weather_agent::Structured;
/// use serde::{Deserialize, Serialize};
///
/// /// Response schema for the agent.
/// #[derive(Debug, Serialize, Deserialize, Structured)]
/// struct WeatherReport {
///     /// A punny response (always required)
///     punny_response: String,
///
///     #[schema(description = "Any interesting information about the weather")]
///     weather_conditions: Option<String>,
/// }
/// ```
#[proc_macro_derive(Structured, attributes(schema))]
pub fn derive_structured(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();

    let schema_json = match generate_schema(&input) {
        Ok(tokens) => tokens,
        Err(err) => return err.to_compile_error().into(),
    };

    let description = match extract_description(&input.attrs) {
        Some(desc) => quote! { Some(#desc.to_string()) },
        None => quote! { None },
    };

    let expanded = quote! {
        impl weather_agent::agent::StructuredProvider for #name {
            fn schema() -> weather_agent::JsonSchema {
                weather_agent::JsonSchema {
                    name: #name_str.to_string(),
                    description: #description,
                    schema: #schema_json,
                    strict: None,
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn generate_schema(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    match &input.data {
        Data::Struct(data_struct) => {
            let Fields::Named(fields) = &data_struct.fields else {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Structured can only be derived for structs with named fields",
                ));
            };

            let container = serde_options(&input.attrs)?;

            let mut keys = Vec::new();
            let mut values = Vec::new();
            let mut required = Vec::new();

            for field in &fields.named {
                let Some(ident) = field.ident.as_ref() else { continue };
                let options = serde_options(&field.attrs)?;
                if options.skip {
                    continue;
                }
                let raw = ident.to_string();
                let base = raw.trim_start_matches("r#");
                let field_name = match (options.rename, &container.rename_all) {
                    (Some(rename), _) => rename,
                    (None, Some(rule)) => rename_field(base, rule, ident)?,
                    (None, None) => base.to_string(),
                };

                values.push(field_schema(&field.ty, extract_description(&field.attrs)));
                if option_inner(&field.ty).is_none() {
                    required.push(field_name.clone());
                }
                keys.push(field_name);
            }

            Ok(quote! {
                weather_agent::serde_json::json!({
                    "type": "object",
                    "properties": weather_agent::serde_json::json!({
                        #(#keys: #values),*
                    }),
                    "required": [#(#required),*]
                })
            })
        }
        Data::Enum(data_enum) => {
            let container = serde_options(&input.attrs)?;
            let mut variants = Vec::new();
            for variant in &data_enum.variants {
                if !matches!(variant.fields, Fields::Unit) {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "Structured enums may only have unit variants",
                    ));
                }
                let options = serde_options(&variant.attrs)?;
                if options.skip {
                    continue;
                }
                variants.push(match (options.rename, &container.rename_all) {
                    (Some(rename), _) => rename,
                    (None, Some(rule)) => rename_variant(&variant.ident.to_string(), rule, variant)?,
                    (None, None) => variant.ident.to_string(),
                });
            }

            Ok(quote! {
                weather_agent::serde_json::json!({
                    "type": "string",
                    "enum": [#(#variants),*]
                })
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input.ident,
            "Structured can only be derived for structs and enums",
        )),
    }
}

fn field_schema(ty: &Type, description: Option<String>) -> proc_macro2::TokenStream {
    let ty = option_inner(ty).unwrap_or(ty);
    if let Some(inner) = generic_inner(ty, "Box") {
        return field_schema(inner, description);
    }
    let describe_field = description.as_ref().map(|desc| quote! { , "description": #desc });

    if let Some(item) = generic_inner(ty, "Vec") {
        let items = field_schema(item, None);
        return quote! {
            weather_agent::serde_json::json!({ "type": "array", "items": #items #describe_field })
        };
    }

    match json_type_name(ty) {
        Some(type_str) => quote! {
            weather_agent::serde_json::json!({ "type": #type_str #describe_field })
        },
        None => {
            let ty = match ty {
                Type::Reference(reference) => &*reference.elem,
                other => other,
            };
            let describe = description.map(|desc| {
                quote! {
                    if let Some(object) = schema.as_object_mut() {
                        object.insert("description".to_string(), weather_agent::serde_json::json!(#desc));
                    }
                }
            });
            // Parenthesised so `json!` treats the block as an expression
            quote! {
                ({
                    let mut schema = <#ty as weather_agent::agent::StructuredProvider>::schema().schema;
                    #describe
                    schema
                })
            }
        }
    }
}

/// JSON type of a primitive, or `None` for types that carry their own schema
fn json_type_name(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Reference(reference) => json_type_name(&reference.elem),
        Type::Path(type_path) => {
            let segment = type_path.path.segments.last()?;
            match segment.ident.to_string().as_str() {
                "String" | "str" | "char" => Some("string"),
                "bool" => Some("boolean"),
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
                | "u128" | "usize" => Some("integer"),
                "f32" | "f64" => Some("number"),
                "HashMap" | "BTreeMap" | "Map" | "Value" => Some("object"),
                _ => None,
            }
        }
        _ => Some("object"),
    }
}

fn option_inner(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Option")
}

fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else { return None };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}

/// `#[schema(description = "...")]` wins over doc comments.
fn extract_description(attrs: &[Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        let mut description = None;
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                let lit: LitStr = meta.value()?.parse()?;
                description = Some(lit.value());
            }
            Ok(())
        });
        if parsed.is_ok() && description.is_some() {
            return description;
        }
    }

    let lines: Vec<String> = attrs
        .iter()
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) if nv.path.is_ident("doc") => match &nv.value {
                syn::Expr::Lit(expr_lit) => match &expr_lit.lit {
                    Lit::Str(lit_str) => Some(lit_str.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

/// The serde attributes that change which keys appear on the wire
#[derive(Default)]
struct SerdeOptions {
    rename: Option<String>,
    rename_all: Option<LitStr>,
    skip: bool,
}

fn serde_options(attrs: &[Attribute]) -> syn::Result<SerdeOptions> {
    let mut options = SerdeOptions::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                options.rename = Some(deserialize_name(&meta)?.value());
            } else if meta.path.is_ident("rename_all") {
                options.rename_all = Some(deserialize_name(&meta)?);
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                options.skip = true;
            } else {
                skip_meta(&meta)?;
            }
            Ok(())
        })?;
    }
    Ok(options)
}

/// `name = "x"` or `name(serialize = "..", deserialize = "x")`
fn deserialize_name(meta: &ParseNestedMeta) -> syn::Result<LitStr> {
    if meta.input.peek(Token![=]) {
        return meta.value()?.parse();
    }
    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let value: LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("deserialize") {
            name = Some(value);
        }
        Ok(())
    })?;
    name.ok_or_else(|| meta.error("expected a `deserialize` name"))
}

fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in name.chars() {
        if ch == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.into_iter().map(|w| w.to_lowercase()).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Apply a serde `rename_all` rule to a snake_case field name
fn rename_field<T: quote::ToTokens>(name: &str, rule: &LitStr, span: T) -> syn::Result<String> {
    apply_rule(&split_words(name), name, rule, false, span)
}

/// Apply a serde `rename_all` rule to a PascalCase variant name
fn rename_variant<T: quote::ToTokens>(name: &str, rule: &LitStr, span: T) -> syn::Result<String> {
    apply_rule(&split_words(name), name, rule, true, span)
}

fn apply_rule<T: quote::ToTokens>(
    words: &[String],
    name: &str,
    rule: &LitStr,
    is_variant: bool,
    span: T,
) -> syn::Result<String> {
    let renamed = match rule.value().as_str() {
        // serde lowercases the whole identifier without inserting separators
        "lowercase" => name.to_lowercase(),
        "UPPERCASE" => name.to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
            .collect(),
        "snake_case" if is_variant => words.join("_"),
        "snake_case" => name.to_string(),
        "SCREAMING_SNAKE_CASE" => words.join("_").to_uppercase(),
        "kebab-case" => words.join("-"),
        "SCREAMING-KEBAB-CASE" => words.join("-").to_uppercase(),
        other => {
            return Err(syn::Error::new_spanned(
                span,
                format!("unsupported rename_all rule '{}'", other),
            ))
        }
    };
    Ok(renamed)
}
