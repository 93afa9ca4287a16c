// vim: tw=80
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    FnArg,
    Ident,
    ItemTrait,
    Pat,
    ReturnType,
    TraitItem,
    TraitItemFn,
    Type,
    parse2,
    spanned::Spanned
};

/// Everything needed to mock one trait method
struct MockMethod {
    name: Ident,
    /// Argument names to use in the generated impl
    args: Vec<Ident>,
    /// The argument tuple type, like `(u32, String,)`
    args_ty: TokenStream,
    arg_types: Vec<Type>,
    output: TokenStream,
    /// The return type as written, for the generated impl's signature
    ret: ReturnType,
}

/// Reject types that can't be stored in an expectation
fn check_type(ty: &Type, what: &str) -> syn::Result<()> {
    match ty {
        Type::Reference(_) => Err(syn::Error::new(ty.span(),
            format!("mockledger does not support reference {}", what))),
        Type::ImplTrait(_) => Err(syn::Error::new(ty.span(),
            format!("mockledger does not support impl Trait {}", what))),
        Type::Ptr(_) => Err(syn::Error::new(ty.span(),
            format!("mockledger does not support raw pointer {}", what))),
        Type::Paren(p) => check_type(&p.elem, what),
        Type::Group(g) => check_type(&g.elem, what),
        _ => Ok(())
    }
}

fn mock_method(method: &TraitItemFn) -> syn::Result<MockMethod> {
    let sig = &method.sig;
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(syn::Error::new(sig.generics.span(),
            "mockledger does not support generic methods"));
    }
    if let Some(a) = &sig.asyncness {
        return Err(syn::Error::new(a.span(),
            "mockledger does not support async methods"));
    }
    if let Some(v) = &sig.variadic {
        return Err(syn::Error::new(v.span(),
            "mockledger does not support variadic methods"));
    }
    match sig.inputs.first() {
        Some(FnArg::Receiver(r))
            if r.reference.is_some() && r.mutability.is_none() &&
                r.colon_token.is_none() => (),
        _ => return Err(syn::Error::new(sig.span(),
            "mockledger can only mock methods that take &self"))
    }

    let mut args = Vec::new();
    let mut arg_types = Vec::new();
    for (i, fn_arg) in sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(pt) = fn_arg else {
            return Err(syn::Error::new(fn_arg.span(), "Unexpected receiver"));
        };
        check_type(&pt.ty, "arguments")?;
        let name = match &*pt.pat {
            Pat::Ident(pi) if pi.by_ref.is_none() && pi.subpat.is_none() =>
                pi.ident.clone(),
            _ => format_ident!("arg{}", i)
        };
        args.push(name);
        arg_types.push((*pt.ty).clone());
    }

    let output = match &sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => {
            check_type(ty, "return values")?;
            quote!(#ty)
        }
    };
    Ok(MockMethod {
        name: sig.ident.clone(),
        args,
        args_ty: quote!((#(#arg_types,)*)),
        arg_types,
        output,
        ret: sig.output.clone(),
    })
}

fn gen_mock(attrs: TokenStream, input: TokenStream)
    -> syn::Result<TokenStream>
{
    if !attrs.is_empty() {
        return Err(syn::Error::new(attrs.span(),
            "automock does not take any arguments"));
    }
    let item: ItemTrait = parse2(input)?;
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(item.generics.span(),
            "mockledger does not support generic traits"));
    }

    let mut methods = Vec::new();
    let mut errors: Option<syn::Error> = None;
    for ti in item.items.iter() {
        let r = match ti {
            TraitItem::Fn(f) => mock_method(f).map(|m| methods.push(m)),
            TraitItem::Type(t) => Err(syn::Error::new(t.span(),
                "mockledger does not support associated types")),
            TraitItem::Const(c) => Err(syn::Error::new(c.span(),
                "mockledger does not support associated constants")),
            _ => Err(syn::Error::new(ti.span(),
                "mockledger does not support this trait item")),
        };
        if let Err(e) = r {
            match errors.as_mut() {
                Some(errors) => errors.combine(e),
                None => errors = Some(e)
            }
        }
    }
    if let Some(e) = errors {
        return Err(e);
    }

    let vis = &item.vis;
    let ident = &item.ident;
    let unsafety = &item.unsafety;
    let mock_ident = format_ident!("Mock{}", ident);
    let iface_name = ident.to_string();
    let names = methods.iter()
        .map(|m| m.name.to_string())
        .collect::<Vec<_>>();
    let expect_idents = methods.iter()
        .map(|m| format_ident!("expect_{}", m.name))
        .collect::<Vec<_>>();
    let args_tys = methods.iter().map(|m| &m.args_ty).collect::<Vec<_>>();
    let outputs = methods.iter().map(|m| &m.output).collect::<Vec<_>>();
    let impl_fns = methods.iter().map(|m| {
        let name = &m.name;
        let method = name.to_string();
        let args = &m.args;
        let arg_types = &m.arg_types;
        let args_ty = &m.args_ty;
        let output = &m.output;
        let ret = &m.ret;
        quote!(
            fn #name(&self, #(#args: #arg_types),*) #ret {
                self.mock.call::<#args_ty, #output>(#method, (#(#args,)*))
            }
        )
    });
    let doc = format!("Mock version of the `{}` trait", ident);

    Ok(quote!(
        #[doc = #doc]
        #[derive(Clone)]
        #vis struct #mock_ident {
            mock: ::mockledger::Mock,
        }
        impl #mock_ident {
            #vis fn new() -> Self {
                #mock_ident {
                    mock: ::mockledger::Mock::new::<Self>(),
                }
            }
            #(
                #[track_caller]
                #vis fn #expect_idents(&self)
                    -> ::mockledger::Call<#args_tys, #outputs>
                {
                    self.mock.expect(#names)
                }
            )*
        }
        impl ::mockledger::Interface for #mock_ident {
            const NAME: &'static str = #iface_name;
            fn register(methods: &mut ::mockledger::MethodTableBuilder) {
                #(methods.method::<#args_tys, #outputs>(#names);)*
            }
        }
        impl ::std::default::Default for #mock_ident {
            fn default() -> Self {
                Self::new()
            }
        }
        impl ::std::convert::AsRef<::mockledger::Mock> for #mock_ident {
            fn as_ref(&self) -> &::mockledger::Mock {
                &self.mock
            }
        }
        #unsafety impl #ident for #mock_ident {
            #(#impl_fns)*
        }
    ))
}

/// Emit the trait unchanged, followed by its mock or by compile errors.
pub(crate) fn do_automock(attrs: TokenStream, input: TokenStream)
    -> TokenStream
{
    let generated = gen_mock(attrs, input.clone())
        .unwrap_or_else(syn::Error::into_compile_error);
    let mut output = input;
    output.extend(generated);
    output
}
