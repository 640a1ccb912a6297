use proc_macro::TokenStream;
use quote::quote;
use syn::*;

/// Column name of a field: raw identifiers lose `r#`, a trailing `_` (used to dodge
/// keywords such as `type_`) is dropped.
fn column_name(ident: &Ident) -> String {
    let name = ident.to_string();
    let name = name.trim_start_matches("r#");
    name.strip_suffix('_').unwrap_or(name).to_string()
}

#[proc_macro_derive(TableRow)]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match input.data {
        syn::Data::Struct(data) => match data.fields {
            syn::Fields::Named(fields) => fields.named,
            _ => panic!("TableRow can only be derived for named struct"),
        },
        _ => panic!("TableRow only supports structs"),
    };

    let has_index = fields
        .iter()
        .any(|f| f.ident.as_ref().is_some_and(|i| i == "index"));
    if !has_index {
        panic!("TableRow requires an `index: i64` field");
    }

    let columns: Vec<String> = fields
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .map(column_name)
        .collect();

    let cells = fields.iter().filter_map(|f| {
        let fname = f.ident.as_ref()?;
        let col = column_name(fname);
        Some(quote! {
            (#col, IntoCell::to_cell(&self.#fname))
        })
    });

    let expanded = quote! {
        impl TableRow for #name {
            const COLUMNS: &'static [&'static str] = &[#(#columns),*];

            fn index(&self) -> i64 {
                self.index
            }

            fn set_index(&mut self, index: i64) {
                self.index = index;
            }

            fn cells(&self) -> Vec<(&'static str, Cell)> {
                vec![#(#cells),*]
            }
        }
    };

    TokenStream::from(expanded)
}
